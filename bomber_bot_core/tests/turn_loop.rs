use std::io::Cursor;

use bomber_bot_core::{
    agent::{Agent, AgentConfig, HazardAwareAgent, Plan, Verdict},
    protocol::{ProtocolError, TurnReader},
};

const GAME: &str = "\
7 5 0
.......
.X.X.X.
...0...
.X.X.X.
.......
2
0 0 2 2 1 3
0 1 6 4 1 3
.......
.X.X.X.
...0...
.X.X.X.
.......
3
0 0 2 1 1 3
0 1 6 4 1 3
1 0 2 2 7 3
.......
.X.X.X
";

fn play(input: &str) -> (Vec<String>, Option<ProtocolError>) {
    let mut reader = TurnReader::open(Cursor::new(input)).expect("header");
    let mut agent = HazardAwareAgent::new(reader.header().my_id, AgentConfig::default());
    let mut output = Vec::new();
    loop {
        match reader.read_turn() {
            Ok(Some(snapshot)) => output.push(agent.act(&snapshot).to_string()),
            Ok(None) => return (output, None),
            Err(err) => return (output, Some(err)),
        }
    }
}

#[test]
fn bombs_the_box_then_runs_for_cover() {
    let (output, error) = play(GAME);
    assert_eq!(output, vec!["BOMB 2 1", "MOVE 2 0"]);
    assert!(matches!(
        error,
        Some(ProtocolError::MalformedRow {
            row: 1,
            expected: 7,
            found: 6
        })
    ));
}

#[test]
fn every_turn_yields_exactly_one_verified_decision() {
    let mut reader = TurnReader::open(Cursor::new(GAME)).unwrap();
    let agent = HazardAwareAgent::new(0, AgentConfig::default());

    let first = reader.read_turn().unwrap().unwrap();
    let decision = agent.decide(&first);
    assert_eq!(
        decision.plan,
        Plan::PlaceBomb {
            at: first.me().position,
            destroys: 1
        }
    );
    assert_eq!(decision.verdict, Verdict::Verified);

    let second = reader.read_turn().unwrap().unwrap();
    assert_eq!(second.placement_budget(second.me()), 0);
    let decision = agent.decide(&second);
    assert!(matches!(decision.plan, Plan::Retreat(_)));
    assert!(!decision.place_bomb);
}

#[test]
fn clean_end_of_input_stops_quietly() {
    let header_only = "7 5 0\n";
    let (output, error) = play(header_only);
    assert!(output.is_empty());
    assert!(error.is_none());
}

use bft_app::{Application, BftApplication, NodeStatus, RequestQuery, TxCode};
use bytes::Bytes;

/// Drive one block the way the engine does: check, deliver, commit.
fn run_block(app: &mut BftApplication, txs: &[&str]) -> Vec<u32> {
    let mut codes = Vec::new();
    for tx in txs {
        let check = app.check_tx(tx.as_bytes());
        if !check.is_ok() {
            codes.push(check.code);
            continue;
        }
        codes.push(app.deliver_tx(tx.as_bytes()).code);
    }
    app.commit();
    codes
}

fn state_of(app: &mut BftApplication) -> String {
    let resp = app.query(RequestQuery::new("state", Bytes::new()));
    String::from_utf8(resp.value.to_vec()).unwrap()
}

#[test]
fn accepted_value_survives_rejected_one() {
    let mut app = BftApplication::new();

    assert_eq!(run_block(&mut app, &["4"]), vec![TxCode::Ok.as_u32()]);
    assert_eq!(state_of(&mut app), "4");

    assert_eq!(run_block(&mut app, &["3"]), vec![TxCode::TxIsNotValid.as_u32()]);
    assert_eq!(state_of(&mut app), "4");
}

#[test]
fn status_change_applies_without_restart() {
    let mut app = BftApplication::new();
    run_block(&mut app, &["2"]);

    let resp = app.query(RequestQuery::new("status", "Malicious"));
    assert!(resp.is_ok());

    assert_eq!(run_block(&mut app, &["8", "7"]), vec![5, 0]);
    assert_eq!(state_of(&mut app), "7");

    let resp = app.query(RequestQuery::new("status", "Correct"));
    assert!(resp.is_ok());
    assert_eq!(app.status(), NodeStatus::Correct);
    assert_eq!(run_block(&mut app, &["9"]), vec![5]);
    assert_eq!(state_of(&mut app), "7");
}

#[test]
fn replicas_with_same_inputs_agree() {
    let blocks: &[&[&str]] = &[&["2", "x", "4"], &["1"], &["10", "12"], &[]];
    let mut a = BftApplication::new();
    let mut b = BftApplication::new();

    for block in blocks {
        assert_eq!(run_block(&mut a, block), run_block(&mut b, block));
        assert_eq!(a.state(), b.state());
    }
    assert_eq!(a.state(), 12);
}

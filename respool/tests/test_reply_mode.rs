use respool::{cmd, pipe, Connection, ConnectionFactoryBuilder, ErrorKind, ReplyMode, Value};
use respool_test::{MockDriver, MockServer};

fn pong() -> Option<Value> {
    Some(Value::SimpleString("PONG".into()))
}

fn ping(con: &mut Connection) -> Option<Value> {
    con.req_command(&cmd("PING")).unwrap()
}

#[test]
fn test_reply_mode_changes() {
    let _ = env_logger::try_init();
    let server = MockServer::start();
    let factory = ConnectionFactoryBuilder::new(server.node()).build().unwrap();
    let mut con = factory.create().unwrap();

    con.reply_off().unwrap();
    assert_eq!(ping(&mut con), None);
    assert_eq!(ping(&mut con), None);
    assert_eq!(ping(&mut con), None);

    assert_eq!(con.reply_on().unwrap(), Value::Okay);
    assert_eq!(ping(&mut con), pong());

    con.skip().unwrap();
    assert_eq!(ping(&mut con), None);
    assert_eq!(ping(&mut con), pong());

    con.skip().unwrap();
    con.reply_off().unwrap();
    assert_eq!(ping(&mut con), None);
    assert_eq!(ping(&mut con), None);
    assert_eq!(ping(&mut con), None);
    assert_eq!(con.reply_mode(), ReplyMode::Off);

    con.skip().unwrap();
    assert_eq!(con.reply_on().unwrap(), Value::Okay);
    assert_eq!(ping(&mut con), pong());

    con.skip().unwrap();
    assert_eq!(con.reply_on().unwrap(), Value::Okay);
    assert_eq!(ping(&mut con), pong());

    assert!(factory.validate(&mut con));
}

#[test]
fn test_raw_client_reply_commands_are_tracked() {
    let server = MockServer::start();
    let factory = ConnectionFactoryBuilder::new(server.node()).build().unwrap();
    let mut con = factory.create().unwrap();

    let reply = con
        .req_command(cmd("client").arg("reply").arg("off"))
        .unwrap();
    assert_eq!(reply, None);
    assert_eq!(con.reply_mode(), ReplyMode::Off);
    assert_eq!(ping(&mut con), None);

    let reply = con
        .req_command(cmd("CLIENT").arg("REPLY").arg("ON"))
        .unwrap();
    assert_eq!(reply, Some(Value::Okay));
    assert_eq!(
        con.req_command(cmd("ECHO").arg("still in sync")).unwrap(),
        Some(Value::BulkString(b"still in sync".to_vec()))
    );
}

#[test]
fn test_pipeline_over_the_wire() {
    let server = MockServer::start();
    let factory = ConnectionFactoryBuilder::new(server.node()).build().unwrap();
    let mut con = factory.create().unwrap();

    let mut p = pipe();
    p.cmd("CLIENT")
        .arg("REPLY")
        .arg("OFF")
        .cmd("PING")
        .cmd("PING")
        .cmd("CLIENT")
        .arg("REPLY")
        .arg("ON")
        .cmd("ECHO")
        .arg("done");
    let replies = con.req_pipeline(&p).unwrap();
    assert_eq!(
        replies,
        vec![
            None,
            None,
            None,
            Some(Value::Okay),
            Some(Value::BulkString(b"done".to_vec())),
        ]
    );
    assert_eq!(ping(&mut con), pong());
}

#[test]
fn test_off_then_on_reads_exactly_once() {
    for commands_between in 0..5 {
        let driver = MockDriver::new(["+OK\r\n"]);
        let handle = driver.handle();
        let mut con = Connection::from_driver(driver);

        con.reply_off().unwrap();
        for _ in 0..commands_between {
            assert_eq!(con.req_command(&cmd("PING")).unwrap(), None);
        }
        assert_eq!(con.reply_on().unwrap(), Value::Okay);

        assert_eq!(handle.reads(), 1);
        assert_eq!(handle.writes(), commands_between + 2);
    }
}

#[test]
fn test_redundant_requests_stay_local() {
    let driver = MockDriver::new(Vec::<&[u8]>::new());
    let handle = driver.handle();
    let mut con = Connection::from_driver(driver);

    assert_eq!(con.reply_on().unwrap(), Value::Okay);
    con.reply_off().unwrap();
    con.reply_off().unwrap();
    con.skip().unwrap();

    assert_eq!(
        handle.commands(),
        vec![vec!["CLIENT".to_string(), "REPLY".into(), "OFF".into()]]
    );
    assert_eq!(handle.reads(), 0);
    assert_eq!(con.reply_mode(), ReplyMode::Off);
}

#[test]
fn test_desync_closes_the_connection() {
    // the canned reply is malformed, so nothing after it can be trusted
    let driver = MockDriver::new(["?garbage\r\n", "+PONG\r\n"]);
    let handle = driver.handle();
    let mut con = Connection::from_driver(driver);

    assert!(con.req_command(&cmd("PING")).is_err());
    assert!(!con.is_open());
    assert!(handle.is_closed());
    assert!(!con.check_connection());
}

#[test]
fn test_hostile_replies_close_the_connection() {
    let deep = [b"*1\r\n".repeat(10_000), b":1\r\n".to_vec()].concat();
    for reply in [b"$9223372036854775000\r\nabc".to_vec(), deep] {
        let driver = MockDriver::new([reply]);
        let handle = driver.handle();
        let mut con = Connection::from_driver(driver);

        let err = con.req_command(&cmd("PING")).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ParseError);
        assert!(!con.is_open());
        assert!(handle.is_closed());
    }
}

#[test]
fn test_pipeline_packs_only_commands_that_are_sent() {
    let driver = MockDriver::new(["+OK\r\n", "+PONG\r\n"]);
    let handle = driver.handle();
    let mut con = Connection::from_driver(driver);

    let mut p = pipe();
    p.cmd("CLIENT")
        .arg("REPLY")
        .arg("ON")
        .cmd("CLIENT")
        .arg("REPLY")
        .arg("OFF")
        .cmd("CLIENT")
        .arg("REPLY")
        .arg("SKIP")
        .cmd("CLIENT")
        .arg("REPLY")
        .arg("ON")
        .cmd("PING");

    let replies = con.req_pipeline(&p).unwrap();
    assert_eq!(replies, vec![Some(Value::Okay), None, None, Some(Value::Okay), pong()]);
    assert_eq!(handle.writes(), 1);
    assert_eq!(
        handle.commands(),
        vec![
            vec!["CLIENT".to_string(), "REPLY".into(), "OFF".into()],
            vec!["CLIENT".to_string(), "REPLY".into(), "ON".into()],
            vec!["PING".to_string()],
        ]
    );
}

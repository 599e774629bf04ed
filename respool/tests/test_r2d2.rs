use std::{thread, time::Duration};

use r2d2::ManageConnection;
use respool::{cmd, ConnectionFactoryBuilder, Value};
use respool_test::MockServer;

#[test]
fn test_r2d2() {
    let _ = env_logger::try_init();
    let server = MockServer::start();
    let factory = ConnectionFactoryBuilder::new(server.node())
        .client_name("pooled")
        .build()
        .unwrap();
    let pool = r2d2::Pool::builder()
        .max_size(4)
        .connection_timeout(Duration::from_secs(5))
        .build(factory)
        .unwrap();

    let handles: Vec<_> = (0..8)
        .map(|i| {
            let pool = pool.clone();
            thread::spawn(move || {
                let mut con = pool.get().unwrap();
                let message = format!("worker-{i}");
                let reply = con.req_command(cmd("ECHO").arg(&message)).unwrap();
                assert_eq!(reply, Some(Value::BulkString(message.into_bytes())));
            })
        })
        .collect();

    for handle in handles {
        handle.join().unwrap();
    }
    assert!(server.connections_accepted() <= 4);
}

#[test]
fn test_connection_left_with_replies_off_is_broken() {
    let server = MockServer::start();
    let factory = ConnectionFactoryBuilder::new(server.node()).build().unwrap();
    let mut con = factory.connect().unwrap();

    assert!(factory.is_valid(&mut con).is_ok());
    assert!(!factory.has_broken(&mut con));

    con.skip().unwrap();
    assert!(factory.has_broken(&mut con));
    assert_eq!(con.req_command(&cmd("PING")).unwrap(), None);
    assert!(!factory.has_broken(&mut con));

    con.close();
    assert!(factory.has_broken(&mut con));
    assert!(factory.is_valid(&mut con).is_err());
}

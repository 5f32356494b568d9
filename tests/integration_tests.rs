//! End-to-end tests: a simulated supervisor drives a core through the
//! handshake, bootstrap and admin session over in-memory pipes.

use fcnet_core::admin::{AUTH_FAILED, CommandError, NO_SUCH_FUNCTION, Request};
use fcnet_core::benc::Dict;
use fcnet_core::error::CoreError;
use fcnet_core::handshake::HandshakeError;
use fcnet_core::log::Log;
use fcnet_core::node::{CoreSettings, IdentityError, bootstrap, run};
use fcnet_core::ServeExit;
use fcnet_integration_tests::{INVALID_KEY, VALID_ADDRESS, VALID_KEY, auth_request, initial_config, pipes};

// ============================================================================
// Handshake
// ============================================================================

#[tokio::test]
async fn test_session_from_handshake_to_exit() {
    let (channel, mut angel) = pipes();
    let settings = CoreSettings::default();

    let core = run(channel, &settings);
    let supervisor = async move {
        angel.send(&initial_config(VALID_KEY)).await;

        let magic = angel.read_ack().await;
        assert_eq!(magic.len(), 16);
        assert!(magic.bytes().all(|b| b.is_ascii_hexdigit()));

        let pong = angel.call("ping", "abc").await;
        assert_eq!(pong.get_str(b"txid"), Some("abc"));
        assert_eq!(pong.get_str(b"q"), Some("pong"));

        let memory = angel.call("memory", "mem").await;
        assert!(memory.get_int(b"bytes").unwrap() > 0);

        let status = angel.call("RouterModule_status", "r").await;
        assert_eq!(status.get_str(b"ipv6"), Some(VALID_ADDRESS));

        let unknown = angel.call("Nope_nothing", "u").await;
        assert_eq!(unknown.get_str(b"error"), Some(NO_SUCH_FUNCTION));

        let refused = angel.call("Core_exit", "x1").await;
        assert_eq!(refused.get_str(b"error"), Some(AUTH_FAILED));

        let bye = angel.auth_call("Core_exit", "x2", Dict::new()).await;
        assert_eq!(bye.get_str(b"txid"), Some("x2"));
        assert_eq!(bye.get_str(b"error"), Some("none"));
    };

    let (exit, ()) = tokio::join!(core, supervisor);
    assert_eq!(exit.unwrap(), ServeExit::Terminate(1));
}

#[tokio::test]
async fn test_config_missing_admin_writes_no_ack() {
    let (channel, mut angel) = pipes();
    angel
        .send(&Dict::new().with("privateKey", VALID_KEY))
        .await;

    let err = bootstrap(channel, &CoreSettings::default()).await.unwrap_err();
    assert!(matches!(
        err,
        CoreError::Handshake(HandshakeError::MissingCredentials)
    ));
    assert!(angel.drain().await.is_empty());
}

#[tokio::test]
async fn test_malformed_key_is_fatal() {
    let (channel, mut angel) = pipes();
    angel.send(&initial_config("not-hex")).await;

    let err = bootstrap(channel, &CoreSettings::default()).await.unwrap_err();
    assert!(matches!(
        err,
        CoreError::Handshake(HandshakeError::InvalidPrivateKeyEncoding(_))
    ));
    assert!(angel.drain().await.is_empty());
}

#[tokio::test]
async fn test_oversized_config_is_fatal() {
    let (channel, mut angel) = pipes();
    let settings = CoreSettings::default();

    let mut blob = b"d10:privateKey20000:".to_vec();
    blob.extend(std::iter::repeat_n(b'a', settings.max_config_size));
    angel.send_raw(&blob).await;

    let err = bootstrap(channel, &settings).await.unwrap_err();
    assert!(matches!(
        err,
        CoreError::Handshake(HandshakeError::ConfigTooLarge { .. })
    ));
    assert!(angel.drain().await.is_empty());
}

#[tokio::test]
async fn test_invalid_identity_is_fatal() {
    let (channel, mut angel) = pipes();
    angel.send(&initial_config(INVALID_KEY)).await;

    let err = bootstrap(channel, &CoreSettings::default()).await.unwrap_err();
    assert!(matches!(
        err,
        CoreError::Identity(IdentityError::InvalidIdentity { .. })
    ));
}

#[tokio::test]
async fn test_supervisor_hangup_is_fatal() {
    let (channel, mut angel) = pipes();
    angel.send(&initial_config(VALID_KEY)).await;

    let (_core, mut server) = bootstrap(channel, &CoreSettings::default()).await.unwrap();
    angel.read_ack().await;
    angel.close_input().await;

    assert!(server.serve().await.is_err());
}

// ============================================================================
// Admin session
// ============================================================================

#[tokio::test]
async fn test_requests_in_same_write_as_config() {
    let (channel, mut angel) = pipes();
    let mut input = initial_config(VALID_KEY).to_bytes();
    input.extend(Dict::new().with("q", "ping").with("txid", "early").to_bytes());
    input.extend(auth_request("Core_exit", "end", Dict::new()).to_bytes());
    angel.send_raw(&input).await;

    let exit = run(channel, &CoreSettings::default()).await.unwrap();
    assert_eq!(exit, ServeExit::Terminate(1));

    angel.read_ack().await;
    assert_eq!(angel.recv().await.get_str(b"txid"), Some("early"));
    assert_eq!(angel.recv().await.get_str(b"txid"), Some("end"));
}

#[tokio::test]
async fn test_late_registration_is_visible() {
    let (channel, mut angel) = pipes();
    angel.send(&initial_config(VALID_KEY)).await;
    let (core, mut server) = bootstrap(channel, &CoreSettings::default()).await.unwrap();

    let supervisor = async {
        angel.read_ack().await;
        let before = angel.call("Plugin_hello", "1").await;
        assert_eq!(before.get_str(b"error"), Some(NO_SUCH_FUNCTION));

        core.admin()
            .register("Plugin_hello", false, |_: &Request| {
                Ok(Dict::new().with("hello", "world"))
            })
            .unwrap();

        let after = angel.call("Plugin_hello", "2").await;
        assert_eq!(after.get_str(b"hello"), Some("world"));

        angel.auth_call("Core_exit", "3", Dict::new()).await;
    };

    let (exit, ()) = tokio::join!(server.serve(), supervisor);
    assert_eq!(exit.unwrap(), ServeExit::Terminate(1));
}

#[tokio::test]
async fn test_handler_failure_does_not_stop_server() {
    let (channel, mut angel) = pipes();
    angel.send(&initial_config(VALID_KEY)).await;
    let (core, mut server) = bootstrap(channel, &CoreSettings::default()).await.unwrap();
    core.admin()
        .register("Broken_always", false, |_: &Request| {
            Err(CommandError::Failed("disk unplugged".into()))
        })
        .unwrap();

    let supervisor = async {
        angel.read_ack().await;
        let failed = angel.call("Broken_always", "1").await;
        assert_eq!(failed.get_str(b"error"), Some("disk unplugged"));
        assert_eq!(failed.get_str(b"txid"), Some("1"));

        let pong = angel.call("ping", "2").await;
        assert_eq!(pong.get_str(b"q"), Some("pong"));

        angel.auth_call("Core_exit", "3", Dict::new()).await;
    };

    let (exit, ()) = tokio::join!(server.serve(), supervisor);
    assert!(exit.is_ok());
}

#[tokio::test]
async fn test_wrong_password_rejected() {
    let (channel, mut angel) = pipes();
    angel.send(&initial_config(VALID_KEY)).await;
    let (core, mut server) = bootstrap(channel, &CoreSettings::default()).await.unwrap();

    let supervisor = async {
        angel.read_ack().await;
        let cookie = angel.call("cookie", "c").await;
        let cookie = cookie.get_str(b"cookie").unwrap().to_string();

        let forged = Dict::new()
            .with("q", "auth")
            .with("aq", "Core_exit")
            .with("cookie", cookie.as_str())
            .with(
                "hash",
                fcnet_crypto::digest::credential_hash_hex(b"guess", cookie.as_bytes()),
            )
            .with("txid", "f");
        angel.send(&forged).await;
        let refused = angel.recv().await;
        assert_eq!(refused.get_str(b"error"), Some(AUTH_FAILED));
        assert_eq!(core.admin().exit_requested(), None);

        angel.auth_call("Core_exit", "ok", Dict::new()).await;
    };

    let (exit, ()) = tokio::join!(server.serve(), supervisor);
    assert!(exit.is_ok());
}

#[tokio::test]
async fn test_log_subscription_streams_messages() {
    let (channel, mut angel) = pipes();
    angel.send(&initial_config(VALID_KEY)).await;
    let (core, mut server) = bootstrap(channel, &CoreSettings::default()).await.unwrap();

    let log = core.log();
    core.admin()
        .register("Test_shout", false, move |req: &Request| {
            log.warn(req.arg_str("text").unwrap_or("?"));
            Ok(Dict::new())
        })
        .unwrap();

    let supervisor = async {
        angel.read_ack().await;
        let subscribed = angel
            .auth_call("AdminLog_subscribe", "logs", Dict::new().with("level", "WARN"))
            .await;
        assert_eq!(subscribed.get_str(b"error"), Some("none"));

        angel
            .send(
                &Dict::new()
                    .with("q", "Test_shout")
                    .with("txid", "s")
                    .with("text", "hello operators"),
            )
            .await;
        let response = angel.recv().await;
        assert_eq!(response.get_str(b"txid"), Some("s"));

        let entry = angel.recv().await;
        assert_eq!(entry.get_str(b"txid"), Some("logs"));
        assert_eq!(entry.get_str(b"level"), Some("WARN"));
        assert_eq!(entry.get_str(b"message"), Some("hello operators"));

        angel.auth_call("Core_exit", "end", Dict::new()).await;
    };

    let (exit, ()) = tokio::join!(server.serve(), supervisor);
    assert!(exit.is_ok());
}

#[tokio::test]
async fn test_tunnel_from_config() {
    let (channel, mut angel) = pipes();
    angel
        .send(
            &initial_config(VALID_KEY)
                .with("tunDevice", "")
                .with("addressPrefix", 8i64),
        )
        .await;
    let (core, _server) = bootstrap(channel, &CoreSettings::default()).await.unwrap();

    let tunnel = core.tunnel().unwrap();
    assert_eq!(tunnel.address.to_string(), VALID_ADDRESS);
    assert_eq!(tunnel.prefix, 8);
    assert_eq!(tunnel.mtu, 1312);
}

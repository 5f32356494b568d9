//! Commands every core serves.

use super::{Admin, AdminError, CommandError, Request, ok_response};
use crate::arena::Arena;
use crate::benc::Dict;
use std::sync::Arc;

/// Exit code used by `Core_exit`.
pub const EXIT_CODE: i32 = 1;

/// Register `ping`, `memory`, `cookie`, and `Core_exit`.
///
/// # Errors
///
/// Fails if any of the names is already taken.
pub fn register(admin: &Arc<Admin>, arena: &Arc<Arena>) -> Result<(), AdminError> {
    admin.register("ping", false, |_: &Request| {
        Ok(Dict::new().with("q", "pong"))
    })?;

    let memory = Arc::clone(arena);
    admin.register("memory", false, move |_: &Request| {
        Ok(Dict::new().with("bytes", memory.bytes_allocated()))
    })?;

    admin.register("cookie", false, |_: &Request| {
        Ok(Dict::new().with("cookie", super::auth::unix_now().to_string()))
    })?;

    let owner = Arc::downgrade(admin);
    admin.register("Core_exit", true, move |_: &Request| {
        let admin = owner
            .upgrade()
            .ok_or_else(|| CommandError::Failed("admin closed".into()))?;
        tracing::info!("exit requested over admin channel");
        admin.request_exit(EXIT_CODE);
        Ok(ok_response())
    })?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::admin::testing::{admin, auth_request};
    use crate::admin::AUTH_FAILED;

    fn setup() -> (Arc<Admin>, Arc<Arena>) {
        let admin = admin();
        let arena = Arena::new(1 << 20);
        register(&admin, &arena).unwrap();
        (admin, arena)
    }

    fn call(admin: &Admin, q: &str) -> Dict {
        admin
            .handle(Dict::new().with("q", q).with("txid", "t"))
            .unwrap()
    }

    #[test]
    fn test_ping() {
        let (admin, _) = setup();
        assert_eq!(call(&admin, "ping").get_str(b"q"), Some("pong"));
    }

    #[test]
    fn test_memory_reports_arena() {
        let (admin, arena) = setup();
        let _held = arena.reserve(4096).unwrap();
        assert_eq!(call(&admin, "memory").get_int(b"bytes"), Some(4096));
    }

    #[test]
    fn test_cookie_is_timestamp() {
        let (admin, _) = setup();
        let response = call(&admin, "cookie");
        let cookie: u64 = response.get_str(b"cookie").unwrap().parse().unwrap();
        assert!(cookie.abs_diff(super::super::auth::unix_now()) <= 1);
    }

    #[test]
    fn test_exit_requires_auth() {
        let (admin, _) = setup();
        assert_eq!(call(&admin, "Core_exit").get_str(b"error"), Some(AUTH_FAILED));
        assert_eq!(admin.exit_requested(), None);

        let response = admin.handle(auth_request("Core_exit", "bye", Dict::new())).unwrap();
        assert_eq!(response.get_str(b"error"), Some("none"));
        assert_eq!(admin.exit_requested(), Some(EXIT_CODE));
    }

    #[test]
    fn test_double_registration_fails() {
        let (admin, arena) = setup();
        assert!(matches!(
            register(&admin, &arena),
            Err(AdminError::DuplicateCommand(name)) if name == "ping"
        ));
    }
}

//! Core bootstrap sequence.
//!
//! Brings a core from two freshly inherited pipes to a serving admin
//! channel. The order is fixed:
//!
//! 1. memory arena with its ceiling
//! 2. provisional local log behind an [`IndirectLog`]
//! 3. handshake: read the config, send the acknowledgement
//! 4. admin dispatcher, then the log swapped to the admin log
//! 5. identity derived and checked
//! 6. session layer, switch, router, ducttape, interface controller,
//!    then the tunnel if the config asked for one
//! 7. subsystem commands, then the built-in commands
//!
//! Any failure along the way is fatal. After step 7 the caller runs
//! [`AdminServer::serve`] as the event loop.

use crate::admin::{Admin, AdminLog, AdminServer, ServeExit, builtin};
use crate::arena::Arena;
use crate::channel::Channel;
use crate::error::Result;
use crate::handshake::{Handshake, SyncToken};
use crate::log::{IndirectLog, Log, TracingLog};
use crate::node::config::CoreSettings;
use crate::node::crypto_auth::CryptoAuth;
use crate::node::ducttape::{Ducttape, TunnelDevice};
use crate::node::identity::NetworkIdentity;
use crate::node::interface::InterfaceController;
use crate::node::router::RouterModule;
use crate::node::switch::SwitchCore;
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncWrite};

/// A bootstrapped core: identity plus every live subsystem.
#[derive(Debug)]
pub struct Core {
    identity: Arc<NetworkIdentity>,
    arena: Arc<Arena>,
    admin: Arc<Admin>,
    log: Arc<IndirectLog>,
    crypto_auth: Arc<CryptoAuth>,
    switch: Arc<SwitchCore>,
    router: Arc<RouterModule>,
    ducttape: Arc<Ducttape>,
    interfaces: Arc<InterfaceController>,
    tunnel: Option<TunnelDevice>,
}

impl Core {
    /// The node identity.
    #[must_use]
    pub fn identity(&self) -> &Arc<NetworkIdentity> {
        &self.identity
    }

    /// The memory arena.
    #[must_use]
    pub fn arena(&self) -> &Arc<Arena> {
        &self.arena
    }

    /// The admin dispatcher.
    #[must_use]
    pub fn admin(&self) -> &Arc<Admin> {
        &self.admin
    }

    /// The log every subsystem writes to.
    #[must_use]
    pub fn log(&self) -> Arc<dyn Log> {
        self.log.clone()
    }

    /// Session layer.
    #[must_use]
    pub fn crypto_auth(&self) -> &Arc<CryptoAuth> {
        &self.crypto_auth
    }

    /// Switch fabric.
    #[must_use]
    pub fn switch(&self) -> &Arc<SwitchCore> {
        &self.switch
    }

    /// Router.
    #[must_use]
    pub fn router(&self) -> &Arc<RouterModule> {
        &self.router
    }

    /// Router/switch glue.
    #[must_use]
    pub fn ducttape(&self) -> &Arc<Ducttape> {
        &self.ducttape
    }

    /// Interface controller.
    #[must_use]
    pub fn interfaces(&self) -> &Arc<InterfaceController> {
        &self.interfaces
    }

    /// Tunnel set up during bootstrap, if any.
    #[must_use]
    pub fn tunnel(&self) -> Option<&TunnelDevice> {
        self.tunnel.as_ref()
    }
}

/// Run the bootstrap sequence on `channel`.
///
/// Returns the live core and the admin server that owns the channel.
///
/// # Errors
///
/// Any [`CoreError`](crate::error::CoreError); all are fatal.
pub async fn bootstrap<R, W>(
    mut channel: Channel<R, W>,
    settings: &CoreSettings,
) -> Result<(Core, AdminServer<R, W>)>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let arena = Arena::new(settings.arena_limit);

    let local: Arc<dyn Log> = Arc::new(TracingLog);
    let log = IndirectLog::new(Arc::clone(&local));

    let token = SyncToken::generate()?;
    let config = Handshake::new(token)
        .with_max_config_size(settings.max_config_size)
        .run(&mut channel, log.as_ref())
        .await?;
    let credentials = config.credentials;

    let admin = Admin::new(credentials.admin_password, token, settings.admin());
    let (admin_log, log_messages) = AdminLog::new(local, settings.log_queue_capacity);
    admin_log.register_commands(&admin)?;
    log.swap(admin_log);
    let logger: Arc<dyn Log> = log.clone();

    let identity = Arc::new(NetworkIdentity::from_private_key(credentials.private_key)?);
    logger.info(&format!("node address {}", identity.address()));

    let crypto_auth = CryptoAuth::new(identity.private_key(), Arc::clone(&logger), &arena)?;
    let switch = SwitchCore::new(Arc::clone(&logger), &arena)?;
    let router = RouterModule::new(
        Arc::clone(&switch),
        *identity.public_key(),
        identity.address(),
        logger.as_ref(),
        &arena,
    )?;
    let ducttape = Ducttape::new(
        Arc::clone(&switch),
        Arc::clone(&router),
        identity.private_key(),
        Arc::clone(&logger),
        &arena,
    )?;
    let interfaces = InterfaceController::new(
        Arc::clone(&crypto_auth),
        Arc::clone(&switch),
        Arc::clone(&router),
        &arena,
    )?;
    let tunnel = match &config.tunnel {
        Some(request) => Some(ducttape.init_tunnel(request)?),
        None => None,
    };

    switch.register_commands(&admin)?;
    router.register_commands(&admin)?;
    interfaces.register_commands(&admin)?;
    crypto_auth.register_commands(&admin)?;
    ducttape.register_commands(&admin)?;
    builtin::register(&admin, &arena)?;

    logger.debug(&format!(
        "bootstrap complete, {} bytes in use",
        arena.bytes_allocated()
    ));

    let server = AdminServer::new(Arc::clone(&admin), channel, Arc::clone(&arena))
        .with_log_messages(log_messages);

    let core = Core {
        identity,
        arena,
        admin,
        log,
        crypto_auth,
        switch,
        router,
        ducttape,
        interfaces,
        tunnel,
    };
    Ok((core, server))
}

/// Bootstrap and serve until exit is requested.
///
/// # Errors
///
/// Any fatal [`CoreError`](crate::error::CoreError), including the
/// supervisor closing the channel.
pub async fn run<R, W>(channel: Channel<R, W>, settings: &CoreSettings) -> Result<ServeExit>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let (core, mut server) = bootstrap(channel, settings).await?;
    let exit = server.serve().await;
    drop(core);
    Ok(exit?)
}

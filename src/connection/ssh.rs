//! SSH backend on top of russh
//!
//! The session is established on first use. A target behind a gateway is
//! reached through a `direct-tcpip` channel on the gateway's own
//! authenticated session, so every hop is authenticated exactly once no
//! matter how many downstream channels are opened.

use async_trait::async_trait;
use futures::future::BoxFuture;
use russh::client::{self, Handle, Msg};
use russh::{Channel, Disconnect};
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncRead;
use tokio::sync::{Mutex, OnceCell};
use tracing::{debug, info};

use super::channel::{drain, spawn_pump};
use super::error::ConnectionError;
use super::handler::ClientHandler;
use super::io::{CountingReader, ProxyStream};
use super::{shell, Connection, FileStat};
use crate::execution::{
    build_command, shell_quote, Completion, CommandError, OutputStream, ResultPromise, RunOptions,
};
use crate::host::{GatewayChain, Host, SshHost};
use crate::settings::ConnectSettings;
use crate::ssh_config::{ResolvedProfile, SshConfigChain};

const DEFAULT_IDENTITY_FILES: &[&str] = &["id_ed25519", "id_rsa", "id_ecdsa"];

type Session = Mutex<Handle<ClientHandler>>;

/// How the transport to a host is opened
pub enum Route<'a> {
    Direct { hostname: &'a str, port: u16 },
    ProxyCommand { command: &'a str },
    Gateway {
        via: &'a SshConnection,
        hostname: &'a str,
        port: u16,
    },
}

impl fmt::Display for Route<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Route::Direct { hostname, port } => write!(f, "direct {hostname}:{port}"),
            Route::ProxyCommand { command } => write!(f, "proxy command `{command}`"),
            Route::Gateway {
                via,
                hostname,
                port,
            } => write!(f, "{hostname}:{port} through gateway {}", via.host.addr()),
        }
    }
}

pub struct SshConnection {
    host: Host,
    profile: ResolvedProfile,
    known_hosts: Option<PathBuf>,
    command_timeout: Duration,
    // Dropped before `gateway`, releasing hops in reverse acquisition order
    session: OnceCell<Session>,
    gateway: Option<Box<SshConnection>>,
}

impl SshConnection {
    /// Resolve `host` and its gateways; no network activity happens here
    pub fn new(host: SshHost, settings: &ConnectSettings) -> Result<Self, ConnectionError> {
        let chain = SshConfigChain::load(&settings.config_chain);
        Self::with_config(host, &chain, settings)
    }

    pub fn with_config(
        host: SshHost,
        chain: &SshConfigChain,
        settings: &ConnectSettings,
    ) -> Result<Self, ConnectionError> {
        GatewayChain::of(&host)?;
        let profile = chain.resolve(&host, settings)?;

        let gateway = match host.gateway() {
            Some(gateway) => Some(Box::new(Self::with_config(gateway.clone(), chain, settings)?)),
            None => None,
        };

        Ok(Self {
            host: Host::Ssh(host),
            profile,
            known_hosts: settings.known_hosts.clone(),
            command_timeout: settings.default_command_timeout,
            session: OnceCell::new(),
            gateway,
        })
    }

    pub fn profile(&self) -> &ResolvedProfile {
        &self.profile
    }

    pub fn gateway(&self) -> Option<&SshConnection> {
        self.gateway.as_deref()
    }

    pub fn is_established(&self) -> bool {
        self.session.initialized()
    }

    /// An explicit gateway wins over a configured ProxyCommand
    pub fn route(&self) -> Route<'_> {
        let hostname = self.profile.hostname.as_str();
        let port = self.profile.port;

        match (&self.gateway, &self.profile.proxy_command) {
            (Some(via), _) => Route::Gateway {
                via,
                hostname,
                port,
            },
            (None, Some(command)) => Route::ProxyCommand { command },
            (None, None) => Route::Direct { hostname, port },
        }
    }

    fn sudo(&self) -> bool {
        self.host.use_sudo()
    }

    fn session(&self) -> BoxFuture<'_, Result<&Session, ConnectionError>> {
        Box::pin(async move { self.session.get_or_try_init(|| self.establish()).await })
    }

    async fn establish(&self) -> Result<Session, ConnectionError> {
        let route = self.route();
        debug!("Connecting to {} ({})", self.host.addr(), route);

        let config = Arc::new(client::Config::default());
        let handler = ClientHandler::new(
            self.profile.hostname.clone(),
            self.profile.port,
            self.profile.host_key_policy,
            self.known_hosts.clone(),
        );
        if self.profile.compression {
            debug!("Compression requested for {}, left to negotiation", self.host.addr());
        }

        let connecting = async {
            match route {
                Route::Direct { hostname, port } => {
                    client::connect(config, (hostname, port), handler).await
                }
                Route::ProxyCommand { command } => {
                    let stream = ProxyStream::spawn(command)?;
                    client::connect_stream(config, stream, handler).await
                }
                Route::Gateway {
                    via,
                    hostname,
                    port,
                } => {
                    let channel = via.open_direct_tcpip(hostname, port).await?;
                    client::connect_stream(config, channel.into_stream(), handler).await
                }
            }
        };

        let timeout = self.profile.connect_timeout;
        let mut handle = tokio::time::timeout(timeout, connecting)
            .await
            .map_err(|_| ConnectionError::Timeout {
                host: self.host.addr().to_string(),
                timeout_secs: timeout.as_secs(),
            })?
            .map_err(|e| self.unreachable(e))?;

        self.authenticate(&mut handle).await?;
        info!("Connected to {}", self.host);
        Ok(Mutex::new(handle))
    }

    fn unreachable(&self, error: ConnectionError) -> ConnectionError {
        match error {
            ConnectionError::Ssh(russh::Error::IO(e)) | ConnectionError::Io(e) => {
                ConnectionError::Unreachable {
                    host: self.host.addr().to_string(),
                    reason: e.to_string(),
                }
            }
            other => other,
        }
    }

    async fn authenticate(&self, handle: &mut Handle<ClientHandler>) -> Result<(), ConnectionError> {
        let user = self.profile.user.as_str();

        if let Some(password) = &self.profile.password {
            if handle.authenticate_password(user, password.as_str()).await? {
                return Ok(());
            }
        }

        for path in self.key_candidates() {
            let key = match russh_keys::load_secret_key(&path, None) {
                Ok(key) => key,
                Err(e) => {
                    debug!("Skipping key {}: {}", path.display(), e);
                    continue;
                }
            };

            if handle.authenticate_publickey(user, Arc::new(key)).await? {
                debug!("Authenticated {}@{} with {}", user, self.host.addr(), path.display());
                return Ok(());
            }
        }

        Err(ConnectionError::AuthenticationFailed {
            host: self.host.addr().to_string(),
            user: user.to_string(),
        })
    }

    /// Configured identity files, or the default keys when neither a password
    /// nor an identity file was given
    fn key_candidates(&self) -> Vec<PathBuf> {
        if !self.profile.identity_files.is_empty() {
            return self.profile.identity_files.clone();
        }
        if self.profile.password.is_some() {
            return Vec::new();
        }
        default_identity_files()
    }

    async fn open_direct_tcpip(&self, hostname: &str, port: u16) -> Result<Channel<Msg>, ConnectionError> {
        let session = self.session().await?;
        debug!(
            "Opening direct-tcpip channel to {}:{} through {}",
            hostname,
            port,
            self.host.addr()
        );
        let handle = session.lock().await;
        Ok(handle
            .channel_open_direct_tcpip(hostname, port as u32, "127.0.0.1", 0)
            .await?)
    }

    async fn open_session_channel(&self) -> Result<Channel<Msg>, ConnectionError> {
        let session = self.session().await?;
        let handle = session.lock().await;
        Ok(handle.channel_open_session().await?)
    }

    /// Start `command` on a fresh channel and demultiplex its output
    async fn exec(&self, command: &str, options: &RunOptions) -> Result<ResultPromise, ConnectionError> {
        let channel = self.open_session_channel().await?;

        for (key, value) in &options.env {
            // Servers may refuse variables not listed in AcceptEnv
            debug!("Sending env {} to {}", key, self.host.addr());
            channel.set_env(false, key.as_str(), value.as_str()).await?;
        }

        debug!("Running on {}: {}", self.host.addr(), command);
        channel.exec(true, command).await?;

        let (stdout, stderr, status) = spawn_pump(channel);
        Ok(ResultPromise::new(
            command,
            Box::new(stdout),
            Box::new(stderr),
            Completion::Channel(status),
            options.effective_timeout(self.command_timeout),
        ))
    }
}

fn default_identity_files() -> Vec<PathBuf> {
    let Some(home) = dirs::home_dir() else {
        return Vec::new();
    };

    DEFAULT_IDENTITY_FILES
        .iter()
        .map(|name| home.join(".ssh").join(name))
        .filter(|path| path.exists())
        .collect()
}

#[async_trait]
impl Connection for SshConnection {
    fn host(&self) -> &Host {
        &self.host
    }

    async fn run_promise(
        &self,
        command: &str,
        options: &RunOptions,
    ) -> Result<ResultPromise, CommandError> {
        let sudo = options.effective_sudo(self.sudo());
        let full = build_command(command, options.cwd.as_deref(), sudo);
        Ok(self.exec(&full, options).await?)
    }

    async fn file_stat(&self, path: &str) -> Result<Option<FileStat>, ConnectionError> {
        shell::stat(self, path, self.sudo()).await
    }

    async fn file_read(&self, path: &str) -> Result<OutputStream, ConnectionError> {
        let command = build_command(&format!("cat -- {}", shell_quote(path)), None, self.sudo());
        let mut promise = self.exec(&command, &RunOptions::default()).await?;
        promise
            .take_stdout()
            .ok_or_else(|| ConnectionError::RemoteIo {
                path: path.to_string(),
                reason: "stdout stream unavailable".to_string(),
            })
    }

    async fn file_write(
        &self,
        path: &str,
        source: &mut (dyn AsyncRead + Send + Unpin),
    ) -> Result<u64, ConnectionError> {
        let command = build_command(&format!("cat > {}", shell_quote(path)), None, self.sudo());
        let mut channel = self.open_session_channel().await?;
        channel.exec(true, command.as_str()).await?;

        let mut counted = CountingReader::new(source);
        channel.data(&mut counted).await?;
        channel.eof().await?;

        let (return_code, stderr) = drain(&mut channel).await;
        if return_code != 0 {
            return Err(ConnectionError::RemoteIo {
                path: path.to_string(),
                reason: if stderr.is_empty() {
                    format!("`{command}` exited with {return_code}")
                } else {
                    stderr
                },
            });
        }
        Ok(counted.count())
    }

    async fn file_checksum(&self, path: &str) -> Result<Option<String>, ConnectionError> {
        shell::checksum(self, path, self.sudo()).await
    }

    async fn create_dir_all(&self, path: &str) -> Result<(), ConnectionError> {
        shell::create_dir_all(self, path, self.sudo()).await
    }

    async fn rename(&self, from: &str, to: &str) -> Result<(), ConnectionError> {
        shell::rename(self, from, to, self.sudo()).await
    }

    async fn remove_file(&self, path: &str) -> Result<(), ConnectionError> {
        shell::remove_file(self, path, self.sudo()).await
    }

    async fn restore_ownership(&self, path: &str) -> Result<(), ConnectionError> {
        if !self.sudo() {
            return Ok(());
        }
        let (uid, gid) = shell::effective_ids(self).await?;
        shell::chown(self, path, uid, gid).await
    }

    async fn close(&self) -> Result<(), ConnectionError> {
        if let Some(session) = self.session.get() {
            let handle = session.lock().await;
            if let Err(e) = handle.disconnect(Disconnect::ByApplication, "", "en").await {
                debug!("Disconnect from {} failed: {}", self.host.addr(), e);
            }
            debug!("Closed session to {}", self.host.addr());
        }

        if let Some(gateway) = &self.gateway {
            gateway.close().await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ssh_config::SshConfigFile;

    fn settings() -> ConnectSettings {
        ConnectSettings::without_ssh_config()
    }

    #[test]
    fn test_direct_route() {
        let host = SshHost::new("app.example").unwrap().with_port(2222);
        let conn = SshConnection::new(host, &settings()).unwrap();

        match conn.route() {
            Route::Direct { hostname, port } => {
                assert_eq!(hostname, "app.example");
                assert_eq!(port, 2222);
            }
            other => panic!("unexpected route {other}"),
        }
        assert!(!conn.is_established());
    }

    #[test]
    fn test_proxy_command_route() {
        let file = SshConfigFile::parse(
            "/config",
            "Host app\n  HostName 10.0.0.5\n  ProxyCommand nc %h %p\n",
        )
        .unwrap();
        let chain = SshConfigChain::from_files(vec![file]);
        let host = SshHost::new("app").unwrap();
        let conn = SshConnection::with_config(host, &chain, &settings()).unwrap();

        match conn.route() {
            Route::ProxyCommand { command } => assert_eq!(command, "nc 10.0.0.5 22"),
            other => panic!("unexpected route {other}"),
        }
    }

    #[test]
    fn test_gateway_route_reuses_gateway_connection() {
        let bastion = SshHost::new("bastion.example").unwrap().with_user("jump");
        let host = SshHost::new("internal.example")
            .unwrap()
            .with_gateway(bastion)
            .unwrap();
        let conn = SshConnection::new(host, &settings()).unwrap();

        let gateway = conn.gateway().unwrap();
        assert_eq!(gateway.profile().user, "jump");
        match conn.route() {
            Route::Gateway { via, hostname, port } => {
                assert!(std::ptr::eq(via, gateway));
                assert_eq!(hostname, "internal.example");
                assert_eq!(port, 22);
            }
            other => panic!("unexpected route {other}"),
        }
    }

    #[test]
    fn test_gateway_wins_over_proxy_command() {
        let file = SshConfigFile::parse("/config", "Host *\n  ProxyCommand nc %h %p\n").unwrap();
        let chain = SshConfigChain::from_files(vec![file]);
        let bastion = SshHost::new("bastion.example").unwrap();
        let host = SshHost::new("internal.example")
            .unwrap()
            .with_gateway(bastion)
            .unwrap();
        let conn = SshConnection::with_config(host, &chain, &settings()).unwrap();

        assert!(matches!(conn.route(), Route::Gateway { .. }));
        assert!(matches!(
            conn.gateway().unwrap().route(),
            Route::ProxyCommand { .. }
        ));
    }

    #[test]
    fn test_proxy_jump_fails_before_connecting() {
        let file = SshConfigFile::parse("/config", "Host app\n  ProxyJump bastion\n").unwrap();
        let chain = SshConfigChain::from_files(vec![file]);
        let host = SshHost::new("app").unwrap();

        assert!(matches!(
            SshConnection::with_config(host, &chain, &settings()),
            Err(ConnectionError::Config(_))
        ));
    }

    #[test]
    fn test_explicit_identity_file_is_the_only_candidate() {
        let host = SshHost::new("app.example")
            .unwrap()
            .with_identity_file("/keys/deploy");
        let conn = SshConnection::new(host, &settings()).unwrap();
        assert_eq!(conn.key_candidates(), vec![PathBuf::from("/keys/deploy")]);

        let host = SshHost::new("app.example").unwrap().with_password("secret");
        let conn = SshConnection::new(host, &settings()).unwrap();
        assert!(conn.key_candidates().is_empty());
    }

    #[tokio::test]
    async fn test_close_without_session_is_a_noop() {
        let host = SshHost::new("never.example").unwrap();
        let conn = SshConnection::new(host, &settings()).unwrap();
        assert!(conn.close().await.is_ok());
        assert!(!conn.is_established());
    }
}

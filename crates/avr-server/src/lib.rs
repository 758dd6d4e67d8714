//! AVR device emulator server.
//!
//! This crate puts the device from `avr-core` on the network:
//! - Tokio TCP transport (swappable for Turmoil in the harness)
//! - A dedicated worker task that owns the device engine
//! - A single-client session manager
//! - System time and OS entropy
//!
//! ## Architecture
//!
//! ```text
//! avr-server
//!   ├─ SystemEnv      (production Environment impl)
//!   ├─ TcpTransport   (tokio TcpListener)
//!   ├─ Server         (session manager, one client at a time)
//!   └─ DeviceWorker   (owns DeviceEngine, paces motion steps)
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod error;
mod session;
mod system_env;
mod transport;
mod worker;

use std::net::SocketAddr;

use avr_core::{DeviceConfig, DeviceEngine, MotionProfile};
pub use error::ServerError;
pub use session::{DENIAL_NOTICE, FrameWriter, Server, WELCOME_NOTICE, outbound_message};
pub use system_env::SystemEnv;
pub use transport::{TcpTransport, Transport};
pub use worker::{
    DeviceCommand, DeviceHandle, DeviceWorker, SessionEvent, SessionId, spawn_device,
};

/// Port the emulator listens on unless told otherwise.
pub const DEFAULT_PORT: u16 = 28338;

/// Server configuration for the production runtime.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Interface to listen on (an IP address)
    pub listen_host: String,
    /// TCP port to listen on
    pub listen_port: u16,
    /// Device parameters
    pub device: DeviceConfig,
    /// Step timing of simulated moves
    pub motion: MotionProfile,
}

impl ServerConfig {
    /// Resolve the listen address.
    ///
    /// # Errors
    ///
    /// `ServerError::InvalidAddress` if `listen_host` is not an IP address.
    pub fn listen_addr(&self) -> Result<SocketAddr, ServerError> {
        error::parse_addr(&self.listen_host, self.listen_port)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_host: "0.0.0.0".to_string(),
            listen_port: DEFAULT_PORT,
            device: DeviceConfig::default(),
            motion: MotionProfile::default(),
        }
    }
}

impl Server<TcpTransport> {
    /// Validate the configuration, bind the listener and start the device.
    ///
    /// # Errors
    ///
    /// Returns error if:
    /// - The motion profile is invalid
    /// - The listen address cannot be parsed
    /// - Binding fails (`ServerError::ListenFailed`)
    pub async fn bind(config: ServerConfig) -> Result<Self, ServerError> {
        config.motion.validate()?;
        let addr = config.listen_addr()?;
        let transport = TcpTransport::bind(addr).await?;

        let engine = DeviceEngine::with_profile(config.device, config.motion, SystemEnv::new());
        Ok(Self::with_transport(transport, engine))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_listens_everywhere() {
        let config = ServerConfig::default();
        assert_eq!(config.listen_addr().unwrap(), "0.0.0.0:28338".parse().unwrap());
        assert_eq!(config.device.max_position(), 15_000);
        assert_eq!(config.device.lie_probability(), 10);
    }

    #[tokio::test]
    async fn bind_rejects_hostname() {
        let config = ServerConfig { listen_host: "localhost".into(), ..ServerConfig::default() };
        let err = Server::bind(config).await.err().unwrap();
        assert!(matches!(err, ServerError::InvalidAddress(_)));
    }

    #[tokio::test]
    async fn bind_rejects_bad_motion_profile() {
        let config = ServerConfig {
            listen_host: "127.0.0.1".into(),
            listen_port: 0,
            motion: MotionProfile { decay_factor: 1.5, ..MotionProfile::default() },
            ..ServerConfig::default()
        };
        let err = Server::bind(config).await.err().unwrap();
        assert!(matches!(err, ServerError::Config(_)));
    }

    #[tokio::test]
    async fn bind_ephemeral_port() {
        let config =
            ServerConfig { listen_host: "127.0.0.1".into(), listen_port: 0, ..ServerConfig::default() };
        let server = Server::bind(config).await.unwrap();
        assert_ne!(server.local_addr().unwrap().port(), 0);
        assert!(!server.has_session());
    }
}

use thiserror::Error;

#[derive(Debug, Error)]
pub enum HostError {
    #[error("Address '{addr}' embeds a user, set it with `with_user` instead")]
    AddressContainsUser { addr: String },

    #[error("Address '{addr}' embeds a port, set it with `with_port` instead")]
    AddressContainsPort { addr: String },

    #[error("Empty host address")]
    EmptyAddress,

    #[error("Gateway cycle detected: {chain:?}")]
    GatewayCycle { chain: Vec<String> },

    #[error("Gateway chain for {host} exceeds maximum depth {max}")]
    GatewayTooDeep { host: String, max: usize },

    #[error("Gateway of a gateway is not supported for {host}: proxy command can only describe one hop")]
    NestedGateway { host: String },

    #[error("Host {host} is not an SSH host")]
    NotSsh { host: String },
}

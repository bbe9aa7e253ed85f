//! Gateway (jump host) chains
//!
//! A chain is walked from the target outwards: the first hop is the target's
//! own gateway, the last hop is the machine the controller dials directly.

use std::collections::HashSet;

use super::error::HostError;
use super::ssh::{SshHost, DEFAULT_SSH_PORT};

/// Longest gateway chain accepted at resolution time
pub const MAX_GATEWAY_DEPTH: usize = 8;

#[derive(Debug)]
pub struct GatewayChain<'a> {
    hops: Vec<&'a SshHost>,
}

impl<'a> GatewayChain<'a> {
    /// Walk and validate the gateway chain of `host`
    pub fn of(host: &'a SshHost) -> Result<Self, HostError> {
        let mut seen = HashSet::new();
        let mut visited = vec![host.endpoint()];
        seen.insert(host.endpoint());

        let mut hops = Vec::new();
        let mut current = host.gateway();
        while let Some(gateway) = current {
            let endpoint = gateway.endpoint();
            visited.push(endpoint.clone());
            if !seen.insert(endpoint) {
                return Err(HostError::GatewayCycle { chain: visited });
            }

            hops.push(gateway);
            if hops.len() > MAX_GATEWAY_DEPTH {
                return Err(HostError::GatewayTooDeep {
                    host: host.addr().to_string(),
                    max: MAX_GATEWAY_DEPTH,
                });
            }
            current = gateway.gateway();
        }

        Ok(Self { hops })
    }

    pub fn hops(&self) -> &[&'a SshHost] {
        &self.hops
    }

    pub fn depth(&self) -> usize {
        self.hops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hops.is_empty()
    }
}

/// Synthesize an `ssh -W` proxy command reaching `target` through its gateway
///
/// Used by code paths that shell out to an external transfer tool. Those
/// tools can describe only one hop, so a gateway that has its own gateway is
/// rejected.
pub fn proxy_command(target: &SshHost) -> Result<Option<String>, HostError> {
    let Some(gateway) = target.gateway() else {
        return Ok(None);
    };

    if gateway.gateway().is_some() {
        return Err(HostError::NestedGateway {
            host: target.addr().to_string(),
        });
    }

    let mut command = String::from("ssh -W %h:%p");
    if let Some(port) = gateway.port.filter(|port| *port != DEFAULT_SSH_PORT) {
        command.push_str(&format!(" -p {port}"));
    }
    match &gateway.user {
        Some(user) => command.push_str(&format!(" {user}@{}", gateway.addr())),
        None => command.push_str(&format!(" {}", gateway.addr())),
    }

    Ok(Some(command))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn host(addr: &str) -> SshHost {
        SshHost::new(addr).unwrap()
    }

    #[test]
    fn test_chain_order_is_nearest_first() {
        let outer = host("outer.example");
        let inner = host("inner.example").with_gateway(outer).unwrap();
        let target = host("target.example").with_gateway(inner).unwrap();

        let chain = GatewayChain::of(&target).unwrap();
        let addrs: Vec<&str> = chain.hops().iter().map(|h| h.addr()).collect();
        assert_eq!(addrs, vec!["inner.example", "outer.example"]);
        assert_eq!(chain.depth(), 2);
    }

    #[test]
    fn test_repeated_endpoint_is_a_cycle() {
        let a = host("a.example");
        let b = host("b.example").with_gateway(a).unwrap();
        let result = host("a.example").with_gateway(b);

        match result {
            Err(HostError::GatewayCycle { chain }) => {
                assert_eq!(chain.first().map(String::as_str), Some("a.example:22"));
                assert_eq!(chain.last().map(String::as_str), Some("a.example:22"));
            }
            other => panic!("expected cycle, got {other:?}"),
        }
    }

    #[test]
    fn test_depth_is_bounded() {
        let mut current = host("hop0.example");
        for i in 1..=MAX_GATEWAY_DEPTH {
            current = host(&format!("hop{i}.example"))
                .with_gateway(current)
                .unwrap();
        }

        let result = host("target.example").with_gateway(current);
        assert!(matches!(result, Err(HostError::GatewayTooDeep { .. })));
    }

    #[test]
    fn test_proxy_command_synthesis() {
        let plain = host("target.example");
        assert_eq!(proxy_command(&plain).unwrap(), None);

        let gateway = host("bastion.example").with_user("ops").with_port(2200);
        let target = host("target.example").with_gateway(gateway).unwrap();
        assert_eq!(
            proxy_command(&target).unwrap().as_deref(),
            Some("ssh -W %h:%p -p 2200 ops@bastion.example")
        );

        let gateway = host("bastion.example");
        let target = host("target.example").with_gateway(gateway).unwrap();
        assert_eq!(
            proxy_command(&target).unwrap().as_deref(),
            Some("ssh -W %h:%p bastion.example")
        );
    }

    #[test]
    fn test_proxy_command_rejects_nested_gateway() {
        let outer = host("outer.example");
        let inner = host("inner.example").with_gateway(outer).unwrap();
        let target = host("target.example").with_gateway(inner).unwrap();

        assert!(matches!(
            proxy_command(&target),
            Err(HostError::NestedGateway { .. })
        ));
    }
}

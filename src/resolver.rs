// src/resolver.rs

//! Transport discovery for the shm provider.
//!
//! Wraps a generic [`InfoSource`] and finishes its descriptors: synthesizes
//! missing source/destination addresses, normalizes ordering attributes when
//! fast RMA applies, and clamps the message size according to the CMA probe.

use std::sync::Arc;

use crate::config::{ResolverConfig, SMR_INJECT_SIZE};
use crate::error::{Error, Result};
use crate::info::{
    DomainAttr, EpAttr, Hints, InfoFlags, MrMode, MsgOrder, ShmAddr, TransportInfo, TxAttr,
};
use crate::probe::{CapabilityProbe, CmaProbe};

/// Prefix of addresses derived from a process id or node name.
pub const SMR_PREFIX: &str = "fi_shm://";
/// Prefix of addresses derived from a service name.
pub const SMR_PREFIX_NS: &str = "fi_ns://";

/// Synthesized names are cut to fit a `NAME_MAX` buffer, as `snprintf` would.
const NAME_MAX: usize = 255;
const MAX_NAME_LEN: usize = NAME_MAX - 2;

/// Orderings that rule out the fast RMA path.
const SMR_RMA_ORDER: MsgOrder = MsgOrder::RAR
    .union(MsgOrder::RAW)
    .union(MsgOrder::RAS)
    .union(MsgOrder::WAR)
    .union(MsgOrder::WAW)
    .union(MsgOrder::WAS)
    .union(MsgOrder::SAR)
    .union(MsgOrder::SAW);

/// Predicate deciding whether fast RMA applies to a request.
pub type FastRmaFn = fn(MrMode, MsgOrder) -> bool;

/// Fast RMA needs virtual addressing and no RMA ordering constraints.
pub fn fast_rma_enabled(mr_mode: MrMode, msg_order: MsgOrder) -> bool {
    mr_mode.contains(MrMode::VIRT_ADDR) && !msg_order.intersects(SMR_RMA_ORDER)
}

/// Derive a shm address from a node and service name.
///
/// ```text
/// node + service   fi_ns://<node>:<service>
/// service          fi_ns://<service>
/// node             fi_shm://<node>
/// neither          fi_shm://<pid>
/// ```
pub fn resolve_address(node: Option<&str>, service: Option<&str>) -> ShmAddr {
    let name = match (node, service) {
        (Some(node), Some(service)) => format!("{SMR_PREFIX_NS}{node}:{service}"),
        (None, Some(service)) => format!("{SMR_PREFIX_NS}{service}"),
        (Some(node), None) => format!("{SMR_PREFIX}{node}"),
        (None, None) => format!("{SMR_PREFIX}{}", std::process::id()),
    };

    let mut bytes = name.into_bytes();
    bytes.truncate(MAX_NAME_LEN);
    bytes.push(0);
    ShmAddr::from_bytes(bytes)
}

/// Generic discovery: the descriptors a provider offers for a request.
pub trait InfoSource: Send + Sync {
    fn getinfo(
        &self,
        version: u32,
        node: Option<&str>,
        service: Option<&str>,
        flags: InfoFlags,
        hints: Option<&Hints>,
    ) -> Result<Vec<TransportInfo>>;
}

/// Offers clones of fixed descriptor templates that match the hints.
#[derive(Debug, Clone)]
pub struct StaticInfoSource {
    templates: Vec<TransportInfo>,
}

impl StaticInfoSource {
    pub fn new(templates: Vec<TransportInfo>) -> Self {
        Self { templates }
    }

    /// The single shm descriptor, without addresses.
    pub fn shm() -> Self {
        Self::new(vec![TransportInfo {
            src_addr: None,
            dest_addr: None,
            domain_attr: DomainAttr {
                name: "shm".to_string(),
                mr_mode: MrMode::empty(),
            },
            tx_attr: TxAttr {
                msg_order: MsgOrder::all(),
                inject_size: SMR_INJECT_SIZE,
            },
            ep_attr: EpAttr {
                max_msg_size: usize::MAX,
                max_order_raw_size: usize::MAX,
                max_order_war_size: usize::MAX,
                max_order_waw_size: usize::MAX,
            },
        }])
    }

    /// `template.domain_attr.mr_mode` lists the modes the provider requires;
    /// `template.tx_attr.msg_order` the orderings it can provide.
    fn matches(template: &TransportInfo, hints: &Hints) -> bool {
        if let Some(domain) = &hints.domain_attr {
            if !domain.name.is_empty() && domain.name != template.domain_attr.name {
                return false;
            }
            if !domain.mr_mode.contains(template.domain_attr.mr_mode) {
                return false;
            }
        }
        if let Some(tx) = &hints.tx_attr {
            if !template.tx_attr.msg_order.contains(tx.msg_order) {
                return false;
            }
        }
        true
    }
}

impl InfoSource for StaticInfoSource {
    fn getinfo(
        &self,
        version: u32,
        _node: Option<&str>,
        _service: Option<&str>,
        _flags: InfoFlags,
        hints: Option<&Hints>,
    ) -> Result<Vec<TransportInfo>> {
        let mut out = Vec::new();
        for template in &self.templates {
            if hints.is_some_and(|h| !Self::matches(template, h)) {
                continue;
            }
            let mut info = template.clone();
            if let Some(tx) = hints.and_then(|h| h.tx_attr.as_ref()) {
                info.tx_attr.msg_order = tx.msg_order;
            }
            out.push(info);
        }

        if out.is_empty() {
            tracing::debug!(version, "no transport matches the hints");
            return Err(Error::Discovery("no matching transport".to_string()));
        }
        Ok(out)
    }
}

/// Discovery front end for the shm provider.
pub struct ShmInfoResolver {
    source: Arc<dyn InfoSource>,
    probe: Arc<dyn CapabilityProbe>,
    fast_rma: FastRmaFn,
    config: ResolverConfig,
}

impl ShmInfoResolver {
    pub fn new(source: Arc<dyn InfoSource>, probe: Arc<dyn CapabilityProbe>) -> Self {
        Self {
            source,
            probe,
            fast_rma: fast_rma_enabled,
            config: ResolverConfig::default(),
        }
    }

    /// A resolver over `source` that probes CMA with settings from the environment.
    pub fn from_env(source: Arc<dyn InfoSource>) -> Self {
        let config = ResolverConfig::from_env();
        let probe = Arc::new(CmaProbe::new(config.probe_settle));
        Self::new(source, probe).with_config(config)
    }

    pub fn with_config(mut self, config: ResolverConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_fast_rma(mut self, fast_rma: FastRmaFn) -> Self {
        self.fast_rma = fast_rma;
        self
    }

    pub fn config(&self) -> &ResolverConfig {
        &self.config
    }

    pub fn resolve(
        &self,
        version: u32,
        node: Option<&str>,
        service: Option<&str>,
        flags: InfoFlags,
        hints: Option<&Hints>,
    ) -> Result<Vec<TransportInfo>> {
        let mr_mode = Hints::mr_mode(hints);
        let msg_order = Hints::msg_order(hints);
        let fast_rma = (self.fast_rma)(mr_mode, msg_order);

        let mut infos = self.source.getinfo(version, node, service, flags, hints)?;

        let direct_copy = match self.probe.probe() {
            Ok(supported) => supported,
            Err(e) => {
                tracing::warn!("CMA capability check failed, assuming unsupported: {}", e);
                false
            }
        };
        tracing::debug!(
            ?mr_mode,
            ?msg_order,
            fast_rma,
            direct_copy,
            count = infos.len(),
            "resolving shm transports"
        );

        let source_only = flags.contains(InfoFlags::SOURCE);
        for info in &mut infos {
            if !source_only && info.dest_addr.is_none() {
                info.dest_addr = Some(resolve_address(node, service));
            }

            if info.src_addr.is_none() {
                info.src_addr = Some(if source_only {
                    resolve_address(node, service)
                } else {
                    resolve_address(None, None)
                });
            }

            if fast_rma {
                info.domain_attr.mr_mode = MrMode::VIRT_ADDR;
                info.tx_attr.msg_order = MsgOrder::SAS;
                info.ep_attr.max_order_raw_size = 0;
                info.ep_attr.max_order_waw_size = 0;
                info.ep_attr.max_order_war_size = 0;
            }

            if direct_copy {
                info.ep_attr.max_msg_size = self.config.inject_size;
            }
        }

        Ok(infos)
    }
}

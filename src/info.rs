// src/info.rs

//! Transport descriptors returned by discovery.

use bitflags::bitflags;

bitflags! {
    /// Memory registration requirements of a domain.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct MrMode: u64 {
        const BASIC = 1 << 0;
        const SCALABLE = 1 << 1;
        const LOCAL = 1 << 2;
        const RAW = 1 << 3;
        /// Remote addresses are target virtual addresses, not offsets.
        const VIRT_ADDR = 1 << 4;
        const ALLOCATED = 1 << 5;
        const PROV_KEY = 1 << 6;
        const MMU_NOTIFY = 1 << 7;
        const RMA_EVENT = 1 << 8;
        const ENDPOINT = 1 << 9;
        const HMEM = 1 << 10;
    }
}

bitflags! {
    /// Message ordering guarantees, named `<later>A<earlier>`.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct MsgOrder: u64 {
        const RAR = 1 << 0;
        const RAW = 1 << 1;
        const RAS = 1 << 2;
        const WAR = 1 << 3;
        const WAW = 1 << 4;
        const WAS = 1 << 5;
        const SAR = 1 << 6;
        const SAW = 1 << 7;
        const SAS = 1 << 8;
    }
}

bitflags! {
    /// Flags to a discovery call.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct InfoFlags: u64 {
        const NUMERICHOST = 1 << 55;
        /// `node`/`service` name the local (source) address.
        const SOURCE = 1 << 57;
    }
}

/// A shm transport address: a NUL-terminated byte string.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ShmAddr(Vec<u8>);

impl ShmAddr {
    /// Build an address from a name, appending the terminator.
    pub fn from_name(name: &str) -> Self {
        let mut bytes = Vec::with_capacity(name.len() + 1);
        bytes.extend_from_slice(name.as_bytes());
        bytes.push(0);
        Self(bytes)
    }

    /// Wrap caller-provided address bytes verbatim.
    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }

    /// Length in bytes, terminator included.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// The name without its terminator, if it is valid UTF-8.
    pub fn name(&self) -> Option<&str> {
        let bytes = self.0.strip_suffix(b"\0").unwrap_or(self.0.as_slice());
        std::str::from_utf8(bytes).ok()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DomainAttr {
    pub name: String,
    pub mr_mode: MrMode,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TxAttr {
    pub msg_order: MsgOrder,
    pub inject_size: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct EpAttr {
    pub max_msg_size: usize,
    /// Largest RMA read-after-write that is ordered.
    pub max_order_raw_size: usize,
    /// Largest RMA write-after-read that is ordered.
    pub max_order_war_size: usize,
    /// Largest RMA write-after-write that is ordered.
    pub max_order_waw_size: usize,
}

/// One transport a caller may open.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TransportInfo {
    pub src_addr: Option<ShmAddr>,
    pub dest_addr: Option<ShmAddr>,
    pub domain_attr: DomainAttr,
    pub tx_attr: TxAttr,
    pub ep_attr: EpAttr,
}

/// Caller constraints on discovery. Absent attributes constrain nothing.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Hints {
    pub domain_attr: Option<DomainAttr>,
    pub tx_attr: Option<TxAttr>,
    pub ep_attr: Option<EpAttr>,
}

impl Hints {
    /// Requested memory registration mode, `VIRT_ADDR` when unspecified.
    pub fn mr_mode(hints: Option<&Hints>) -> MrMode {
        hints
            .and_then(|h| h.domain_attr.as_ref())
            .map_or(MrMode::VIRT_ADDR, |d| d.mr_mode)
    }

    /// Requested message ordering, none when unspecified.
    pub fn msg_order(hints: Option<&Hints>) -> MsgOrder {
        hints
            .and_then(|h| h.tx_attr.as_ref())
            .map_or(MsgOrder::empty(), |t| t.msg_order)
    }
}

//! Data model: indices, claims, entries and their labels.

use crate::constants::*;
use crate::errors::Error;
use crate::selector::Selector;
use ipnet::IpNet;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::net::IpAddr;
use std::str::FromStr;

// ─────────────────────────── enums ──────────────────────────────────── //

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AddressFamily {
    Ipv4,
    Ipv6,
}

impl AddressFamily {
    pub fn of(addr: &IpAddr) -> Self {
        match addr {
            IpAddr::V4(_) => AddressFamily::Ipv4,
            IpAddr::V6(_) => AddressFamily::Ipv6,
        }
    }

    pub fn of_net(net: &IpNet) -> Self {
        Self::of(&net.addr())
    }

    pub fn as_str(self) -> &'static str {
        match self {
            AddressFamily::Ipv4 => "ipv4",
            AddressFamily::Ipv6 => "ipv6",
        }
    }
}

impl FromStr for AddressFamily {
    type Err = Error;
    fn from_str(s: &str) -> Result<Self, Error> {
        match s {
            "ipv4" => Ok(AddressFamily::Ipv4),
            "ipv6" => Ok(AddressFamily::Ipv6),
            other => Err(Error::Syntax(format!("unknown address family {other:?}"))),
        }
    }
}

/// Governs nesting between blocks.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BlockKind {
    Aggregate,
    Network,
    Pool,
    #[default]
    Other,
}

impl BlockKind {
    pub fn as_str(self) -> &'static str {
        match self {
            BlockKind::Aggregate => "aggregate",
            BlockKind::Network => "network",
            BlockKind::Pool => "pool",
            BlockKind::Other => "other",
        }
    }
}

impl FromStr for BlockKind {
    type Err = Error;
    fn from_str(s: &str) -> Result<Self, Error> {
        match s {
            "aggregate" => Ok(BlockKind::Aggregate),
            "network" => Ok(BlockKind::Network),
            "pool" => Ok(BlockKind::Pool),
            "other" => Ok(BlockKind::Other),
            other => Err(Error::Syntax(format!("unknown block kind {other:?}"))),
        }
    }
}

impl fmt::Display for BlockKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What kind of value an entry (or claim) resolves to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClaimShape {
    Address,
    Prefix,
    Range,
}

impl ClaimShape {
    pub fn as_str(self) -> &'static str {
        match self {
            ClaimShape::Address => "address",
            ClaimShape::Prefix => "prefix",
            ClaimShape::Range => "range",
        }
    }
}

impl FromStr for ClaimShape {
    type Err = Error;
    fn from_str(s: &str) -> Result<Self, Error> {
        match s {
            "address" => Ok(ClaimShape::Address),
            "prefix" => Ok(ClaimShape::Prefix),
            "range" => Ok(ClaimShape::Range),
            other => Err(Error::Syntax(format!("unknown claim shape {other:?}"))),
        }
    }
}

impl fmt::Display for ClaimShape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ─────────────────────────── identities ─────────────────────────────── //

#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct IndexKey {
    pub namespace: String,
    pub name: String,
}

impl IndexKey {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self { namespace: namespace.into(), name: name.into() }
    }
}

impl fmt::Display for IndexKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

/// Identity of a claim within an index.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ClaimId {
    pub namespace: String,
    pub name: String,
}

impl fmt::Display for ClaimId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

/// Who owns a claim. Two claims with the same name but a different owner
/// never share allocations.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(default)]
pub struct OwnerRef {
    pub group: String,
    pub version: String,
    pub kind: String,
    pub namespace: String,
    pub name: String,
    pub uid: String,
}

impl OwnerRef {
    /// Owner reference of the aggregate claims seeded by `index`.
    pub fn for_index(index: &IndexKey) -> Self {
        Self {
            group: INDEX_OWNER_GROUP.to_string(),
            version: INDEX_OWNER_VERSION.to_string(),
            kind: INDEX_OWNER_KIND.to_string(),
            namespace: index.namespace.clone(),
            name: index.name.clone(),
            uid: String::new(),
        }
    }

    /// Same owner, ignoring the uid.
    pub fn same_owner(&self, other: &OwnerRef) -> bool {
        self.group == other.group
            && self.version == other.version
            && self.kind == other.kind
            && self.namespace == other.namespace
            && self.name == other.name
    }
}

impl fmt::Display for OwnerRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.kind, self.namespace, self.name)
    }
}

// ─────────────────────────── literals ───────────────────────────────── //

/// An address literal, optionally carrying the mask of its subnet
/// (`10.0.0.5` or `10.0.0.5/24`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AddressLiteral {
    pub addr: IpAddr,
    pub prefix_len: Option<u8>,
}

impl AddressLiteral {
    pub fn family(&self) -> AddressFamily {
        AddressFamily::of(&self.addr)
    }
}

impl FromStr for AddressLiteral {
    type Err = Error;
    fn from_str(s: &str) -> Result<Self, Error> {
        if s.contains('/') {
            let net: IpNet = s
                .parse()
                .map_err(|_| Error::Syntax(format!("invalid address {s:?}")))?;
            Ok(Self { addr: net.addr(), prefix_len: Some(net.prefix_len()) })
        } else {
            let addr: IpAddr = s
                .parse()
                .map_err(|_| Error::Syntax(format!("invalid address {s:?}")))?;
            Ok(Self { addr, prefix_len: None })
        }
    }
}

impl fmt::Display for AddressLiteral {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.prefix_len {
            Some(len) => write!(f, "{}/{}", self.addr, len),
            None => write!(f, "{}", self.addr),
        }
    }
}

/// Inclusive `[from, to]` interval of one address family.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IpRange {
    pub from: IpAddr,
    pub to: IpAddr,
}

impl IpRange {
    pub fn new(from: IpAddr, to: IpAddr) -> Result<Self, Error> {
        let ordered = match (from, to) {
            (IpAddr::V4(a), IpAddr::V4(b)) => a <= b,
            (IpAddr::V6(a), IpAddr::V6(b)) => a <= b,
            _ => return Err(Error::Syntax(format!("range {from}-{to} mixes address families"))),
        };
        if !ordered {
            return Err(Error::Syntax(format!("range {from}-{to} is reversed")));
        }
        Ok(Self { from, to })
    }

    pub fn family(&self) -> AddressFamily {
        AddressFamily::of(&self.from)
    }

    pub fn contains(&self, addr: &IpAddr) -> bool {
        match (self.from, self.to, addr) {
            (IpAddr::V4(a), IpAddr::V4(b), IpAddr::V4(x)) => a <= *x && *x <= b,
            (IpAddr::V6(a), IpAddr::V6(b), IpAddr::V6(x)) => a <= *x && *x <= b,
            _ => false,
        }
    }

    /// Minimal CIDR cover of the interval, in address order.
    pub fn to_prefixes(&self) -> Vec<IpNet> {
        match (self.from, self.to) {
            (IpAddr::V4(a), IpAddr::V4(b)) => {
                ipnet::Ipv4Subnets::new(a, b, 0).map(IpNet::V4).collect()
            }
            (IpAddr::V6(a), IpAddr::V6(b)) => {
                ipnet::Ipv6Subnets::new(a, b, 0).map(IpNet::V6).collect()
            }
            _ => Vec::new(),
        }
    }
}

impl FromStr for IpRange {
    type Err = Error;
    fn from_str(s: &str) -> Result<Self, Error> {
        let (from, to) = s
            .split_once('-')
            .ok_or_else(|| Error::Syntax(format!("range {s:?} must look like <from>-<to>")))?;
        let from: IpAddr = from
            .trim()
            .parse()
            .map_err(|_| Error::Syntax(format!("invalid range start in {s:?}")))?;
        let to: IpAddr = to
            .trim()
            .parse()
            .map_err(|_| Error::Syntax(format!("invalid range end in {s:?}")))?;
        IpRange::new(from, to)
    }
}

impl fmt::Display for IpRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.from, self.to)
    }
}

// ─────────────────────────── index ──────────────────────────────────── //

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexPrefix {
    pub prefix: IpNet,
    #[serde(default)]
    pub labels: BTreeMap<String, String>,
}

/// An independent namespace of address space.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Index {
    #[serde(flatten)]
    pub key: IndexKey,
    #[serde(default)]
    pub prefixes: Vec<IndexPrefix>,
}

impl Index {
    pub fn new(key: IndexKey) -> Self {
        Self { key, prefixes: Vec::new() }
    }

    pub fn with_prefix(mut self, prefix: IpNet) -> Self {
        self.prefixes.push(IndexPrefix { prefix, labels: BTreeMap::new() });
        self
    }

    /// Name of the aggregate claim seeded for `prefix`.
    pub fn aggregate_claim_name(&self, prefix: &IpNet) -> String {
        let p = prefix.trunc().to_string().replace(['/', ':'], "-");
        format!("{}.aggregate.{}", self.key.name, p)
    }

    /// The index-owned aggregate claims this index wants to exist.
    pub fn aggregate_claims(&self) -> Vec<Claim> {
        self.prefixes
            .iter()
            .map(|p| {
                let mut claim = Claim::new(
                    self.key.clone(),
                    &self.key.namespace,
                    &self.aggregate_claim_name(&p.prefix),
                    ClaimKind::StaticPrefix(p.prefix.trunc()),
                );
                claim.spec.block_kind = BlockKind::Aggregate;
                claim.spec.labels = p.labels.clone();
                claim.spec.owner = OwnerRef::for_index(&self.key);
                claim
            })
            .collect()
    }
}

// ─────────────────────────── claim ──────────────────────────────────── //

/// What a claim asks for. Exactly one variant; built through
/// [`ClaimKind::from_fields`] when coming from the wire shape.
#[derive(Debug, Clone, PartialEq)]
pub enum ClaimKind {
    StaticAddress(AddressLiteral),
    StaticPrefix(IpNet),
    StaticRange(IpRange),
    DynamicAddress { selector: Selector },
    DynamicPrefix { selector: Selector, prefix_length: u8 },
}

impl ClaimKind {
    pub fn from_fields(
        address: Option<&str>,
        prefix: Option<&str>,
        range: Option<&str>,
        create_prefix: bool,
        prefix_length: Option<u8>,
        selector: Option<Selector>,
    ) -> Result<Self, Error> {
        let set = [address.is_some(), prefix.is_some(), range.is_some()]
            .iter()
            .filter(|b| **b)
            .count();
        if set > 1 {
            return Err(Error::Syntax(
                "a claim may set only one of address, prefix or range".to_string(),
            ));
        }
        if let Some(a) = address {
            return Ok(ClaimKind::StaticAddress(a.parse()?));
        }
        if let Some(p) = prefix {
            let net: IpNet = p
                .parse()
                .map_err(|_| Error::Syntax(format!("invalid prefix {p:?}")))?;
            return Ok(ClaimKind::StaticPrefix(net));
        }
        if let Some(r) = range {
            return Ok(ClaimKind::StaticRange(r.parse()?));
        }
        let selector = selector.unwrap_or_default();
        if create_prefix {
            let prefix_length = prefix_length.ok_or_else(|| {
                Error::Syntax("a dynamic prefix claim needs a prefix length".to_string())
            })?;
            Ok(ClaimKind::DynamicPrefix { selector, prefix_length })
        } else {
            Ok(ClaimKind::DynamicAddress { selector })
        }
    }

    pub fn shape(&self) -> ClaimShape {
        match self {
            ClaimKind::StaticAddress(_) | ClaimKind::DynamicAddress { .. } => ClaimShape::Address,
            ClaimKind::StaticPrefix(_) | ClaimKind::DynamicPrefix { .. } => ClaimShape::Prefix,
            ClaimKind::StaticRange(_) => ClaimShape::Range,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            ClaimKind::StaticAddress(_) => "static-address",
            ClaimKind::StaticPrefix(_) => "static-prefix",
            ClaimKind::StaticRange(_) => "static-range",
            ClaimKind::DynamicAddress { .. } => "dynamic-address",
            ClaimKind::DynamicPrefix { .. } => "dynamic-prefix",
        }
    }
}

/// Wire shape of a claim spec: optional fields, validated into `ClaimSpec`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RawClaimSpec {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prefix: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub range: Option<String>,
    pub create_prefix: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prefix_length: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub selector: Option<Selector>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kind: Option<BlockKind>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub address_family: Option<AddressFamily>,
    pub labels: BTreeMap<String, String>,
    pub default_gateway: bool,
    pub owner: OwnerRef,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawClaimSpec", into = "RawClaimSpec")]
pub struct ClaimSpec {
    pub kind: ClaimKind,
    pub block_kind: BlockKind,
    pub family: Option<AddressFamily>,
    pub labels: BTreeMap<String, String>,
    pub default_gateway: bool,
    pub owner: OwnerRef,
}

impl ClaimSpec {
    pub fn new(kind: ClaimKind) -> Self {
        Self {
            kind,
            block_kind: BlockKind::Other,
            family: None,
            labels: BTreeMap::new(),
            default_gateway: false,
            owner: OwnerRef::default(),
        }
    }
}

impl TryFrom<RawClaimSpec> for ClaimSpec {
    type Error = Error;
    fn try_from(raw: RawClaimSpec) -> Result<Self, Error> {
        let kind = ClaimKind::from_fields(
            raw.address.as_deref(),
            raw.prefix.as_deref(),
            raw.range.as_deref(),
            raw.create_prefix,
            raw.prefix_length,
            raw.selector,
        )?;
        if let Some(k) = raw.labels.keys().find(|k| k.starts_with(LABEL_PREFIX)) {
            return Err(Error::Syntax(format!("label {k:?} uses the reserved {LABEL_PREFIX} prefix")));
        }
        Ok(Self {
            kind,
            block_kind: raw.kind.unwrap_or_default(),
            family: raw.address_family,
            labels: raw.labels,
            default_gateway: raw.default_gateway,
            owner: raw.owner,
        })
    }
}

impl From<ClaimSpec> for RawClaimSpec {
    fn from(spec: ClaimSpec) -> Self {
        let mut raw = RawClaimSpec {
            kind: Some(spec.block_kind),
            address_family: spec.family,
            labels: spec.labels,
            default_gateway: spec.default_gateway,
            owner: spec.owner,
            ..Default::default()
        };
        match spec.kind {
            ClaimKind::StaticAddress(a) => raw.address = Some(a.to_string()),
            ClaimKind::StaticPrefix(p) => raw.prefix = Some(p.to_string()),
            ClaimKind::StaticRange(r) => raw.range = Some(r.to_string()),
            ClaimKind::DynamicAddress { selector } => raw.selector = Some(selector),
            ClaimKind::DynamicPrefix { selector, prefix_length } => {
                raw.create_prefix = true;
                raw.prefix_length = Some(prefix_length);
                raw.selector = Some(selector);
            }
        }
        raw
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum Condition {
    #[default]
    Unknown,
    Ready,
    Failed { reason: String, message: String },
}

/// Resolved state of a claim. Written by the engine only.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ClaimStatus {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prefix: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub range: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default_gateway: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub range_name: Option<String>,
    pub condition: Condition,
}

impl ClaimStatus {
    pub fn is_ready(&self) -> bool {
        self.condition == Condition::Ready
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Claim {
    pub index: IndexKey,
    pub namespace: String,
    pub name: String,
    #[serde(default)]
    pub uid: String,
    pub spec: ClaimSpec,
    #[serde(default)]
    pub status: ClaimStatus,
}

impl Claim {
    /// A claim owned by itself (owner kind `Claim`), as used by tests and
    /// the C ABI when no owner is given.
    pub fn new(index: IndexKey, namespace: &str, name: &str, kind: ClaimKind) -> Self {
        let mut spec = ClaimSpec::new(kind);
        spec.owner = OwnerRef {
            group: INDEX_OWNER_GROUP.to_string(),
            version: INDEX_OWNER_VERSION.to_string(),
            kind: "Claim".to_string(),
            namespace: namespace.to_string(),
            name: name.to_string(),
            uid: String::new(),
        };
        Self {
            index,
            namespace: namespace.to_string(),
            name: name.to_string(),
            uid: String::new(),
            spec,
            status: ClaimStatus::default(),
        }
    }

    pub fn id(&self) -> ClaimId {
        ClaimId { namespace: self.namespace.clone(), name: self.name.clone() }
    }

    pub fn is_index_owned(&self) -> bool {
        self.spec.owner.kind == INDEX_OWNER_KIND
    }

    /// Whether `labels` were written on behalf of this claim.
    pub fn owns(&self, labels: &EntryLabels) -> bool {
        labels.claim_name == self.name && labels.owner.same_owner(&self.spec.owner)
    }

    /// Base labels for an entry of this claim.
    pub fn entry_labels(&self, shape: ClaimShape, family: AddressFamily) -> EntryLabels {
        EntryLabels {
            claim_name: self.name.clone(),
            claim_uid: self.uid.clone(),
            block_kind: self.spec.block_kind,
            shape,
            family,
            subnet: None,
            default_gateway: self.spec.default_gateway,
            owner: self.spec.owner.clone(),
            user: self.spec.labels.clone(),
        }
    }
}

// ─────────────────────────── entry ──────────────────────────────────── //

/// Metadata of one materialized allocation: reserved fields plus the
/// claim's user-defined labels.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntryLabels {
    pub claim_name: String,
    pub claim_uid: String,
    pub block_kind: BlockKind,
    pub shape: ClaimShape,
    pub family: AddressFamily,
    pub subnet: Option<IpNet>,
    pub default_gateway: bool,
    pub owner: OwnerRef,
    pub user: BTreeMap<String, String>,
}

impl EntryLabels {
    /// Flattened view used by selectors and persisted records.
    pub fn to_map(&self) -> BTreeMap<String, String> {
        let mut m = self.user.clone();
        m.insert(LABEL_CLAIM_NAME.into(), self.claim_name.clone());
        m.insert(LABEL_CLAIM_UID.into(), self.claim_uid.clone());
        m.insert(LABEL_BLOCK_KIND.into(), self.block_kind.as_str().into());
        m.insert(LABEL_CLAIM_SHAPE.into(), self.shape.as_str().into());
        m.insert(LABEL_ADDRESS_FAMILY.into(), self.family.as_str().into());
        if let Some(subnet) = &self.subnet {
            m.insert(LABEL_SUBNET.into(), subnet.to_string());
        }
        if self.default_gateway {
            m.insert(LABEL_DEFAULT_GATEWAY.into(), DEFAULT_GATEWAY_VALUE.into());
        }
        m.insert(LABEL_OWNER_GROUP.into(), self.owner.group.clone());
        m.insert(LABEL_OWNER_VERSION.into(), self.owner.version.clone());
        m.insert(LABEL_OWNER_KIND.into(), self.owner.kind.clone());
        m.insert(LABEL_OWNER_NAMESPACE.into(), self.owner.namespace.clone());
        m.insert(LABEL_OWNER_NAME.into(), self.owner.name.clone());
        m
    }

    /// Inverse of [`EntryLabels::to_map`]. Unreserved keys become user labels.
    pub fn from_map(map: &BTreeMap<String, String>) -> Result<Self, Error> {
        let get = |k: &str| map.get(k).cloned().unwrap_or_default();
        let required = |k: &str| {
            map.get(k)
                .cloned()
                .ok_or_else(|| Error::Syntax(format!("entry labels are missing {k}")))
        };
        let subnet = match map.get(LABEL_SUBNET) {
            Some(s) => Some(
                s.parse::<IpNet>()
                    .map_err(|_| Error::Syntax(format!("invalid subnet label {s:?}")))?,
            ),
            None => None,
        };
        let user = map
            .iter()
            .filter(|(k, _)| !RESERVED_LABELS.contains(&k.as_str()))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        Ok(Self {
            claim_name: required(LABEL_CLAIM_NAME)?,
            claim_uid: get(LABEL_CLAIM_UID),
            block_kind: required(LABEL_BLOCK_KIND)?.parse()?,
            shape: required(LABEL_CLAIM_SHAPE)?.parse()?,
            family: required(LABEL_ADDRESS_FAMILY)?.parse()?,
            subnet,
            default_gateway: map.get(LABEL_DEFAULT_GATEWAY).map(String::as_str)
                == Some(DEFAULT_GATEWAY_VALUE),
            owner: OwnerRef {
                group: get(LABEL_OWNER_GROUP),
                version: get(LABEL_OWNER_VERSION),
                kind: get(LABEL_OWNER_KIND),
                namespace: get(LABEL_OWNER_NAMESPACE),
                name: get(LABEL_OWNER_NAME),
                uid: String::new(),
            },
            user,
        })
    }

    pub fn is_owned_by(&self, other: &EntryLabels) -> bool {
        self.claim_name == other.claim_name && self.owner.same_owner(&other.owner)
    }
}

/// One materialized allocation row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entry {
    pub prefix: IpNet,
    pub labels: EntryLabels,
}

impl Entry {
    pub fn new(prefix: IpNet, labels: EntryLabels) -> Self {
        Self { prefix, labels }
    }
}

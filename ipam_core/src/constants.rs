//! Label keys and fixed values shared across the engine.

/// Prefix of every system-reserved label key.
pub const LABEL_PREFIX: &str = "ipam.dev/";

pub const LABEL_CLAIM_NAME: &str = "ipam.dev/claim-name";
pub const LABEL_CLAIM_UID: &str = "ipam.dev/claim-uid";
pub const LABEL_BLOCK_KIND: &str = "ipam.dev/block-kind";
pub const LABEL_CLAIM_SHAPE: &str = "ipam.dev/claim-shape";
pub const LABEL_ADDRESS_FAMILY: &str = "ipam.dev/address-family";
pub const LABEL_SUBNET: &str = "ipam.dev/subnet";
pub const LABEL_DEFAULT_GATEWAY: &str = "ipam.dev/default-gateway";
pub const LABEL_OWNER_GROUP: &str = "ipam.dev/owner-group";
pub const LABEL_OWNER_VERSION: &str = "ipam.dev/owner-version";
pub const LABEL_OWNER_KIND: &str = "ipam.dev/owner-kind";
pub const LABEL_OWNER_NAMESPACE: &str = "ipam.dev/owner-namespace";
pub const LABEL_OWNER_NAME: &str = "ipam.dev/owner-name";

/// Every reserved key, in the order `EntryLabels::to_map` emits them.
pub const RESERVED_LABELS: [&str; 12] = [
    LABEL_CLAIM_NAME,
    LABEL_CLAIM_UID,
    LABEL_BLOCK_KIND,
    LABEL_CLAIM_SHAPE,
    LABEL_ADDRESS_FAMILY,
    LABEL_SUBNET,
    LABEL_DEFAULT_GATEWAY,
    LABEL_OWNER_GROUP,
    LABEL_OWNER_VERSION,
    LABEL_OWNER_KIND,
    LABEL_OWNER_NAMESPACE,
    LABEL_OWNER_NAME,
];

/// Owner reference used for the aggregate claims an index seeds itself.
pub const INDEX_OWNER_GROUP: &str = "ipam.dev";
pub const INDEX_OWNER_VERSION: &str = "v1alpha1";
pub const INDEX_OWNER_KIND: &str = "Index";

/// Value stored under `LABEL_DEFAULT_GATEWAY` when the marker is set.
pub const DEFAULT_GATEWAY_VALUE: &str = "true";

pub const V4_BITS: u8 = 32;
pub const V6_BITS: u8 = 128;

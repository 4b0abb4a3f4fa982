//! Capability checks against the permission verification API.

mod cached_client;
mod client;
mod types;

pub use cached_client::{CachedCapabilityClient, CAPABILITIES_PREFIX, MENU_PREFIX};
pub use client::{endpoints, CapabilityClient};
pub use types::{
  CapabilitiesResponse, GroupsResponse, MenuFunctions, MenuResponse, MenuTree, PermissionOrigin,
  UserGroup, UserId, VerifyPermissionResponse,
};

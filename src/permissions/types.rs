//! Wire types for the permission verification endpoints.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Identifier of a user whose permissions are being checked.
pub type UserId = u64;

/// Functions of one domain, each mapped to the capability codes it requires.
pub type MenuFunctions = BTreeMap<String, Vec<String>>;

/// Menu tree keyed by domain.
pub type MenuTree = BTreeMap<String, MenuFunctions>;

/// Every capability granted to a user
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CapabilitiesResponse {
  pub usuario_id: UserId,
  pub capacidades: Vec<String>,
  pub total: usize,
}

impl CapabilitiesResponse {
  pub fn new(user: UserId, capacidades: Vec<String>) -> Self {
    Self {
      usuario_id: user,
      total: capacidades.len(),
      capacidades,
    }
  }

  pub fn contains(&self, capability: &str) -> bool {
    self.capacidades.iter().any(|c| c == capability)
  }
}

/// Where a granted permission came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PermissionOrigin {
  Grupo,
  ExcepcionalConcedido,
}

/// Answer to a single-capability check
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerifyPermissionResponse {
  pub usuario_id: UserId,
  pub capacidad_codigo: String,
  pub tiene_permiso: bool,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub origen: Option<PermissionOrigin>,
}

/// Navigation menu filtered by the user's capabilities
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MenuResponse {
  pub usuario_id: UserId,
  pub menu: MenuTree,
}

/// A group membership
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserGroup {
  pub grupo_id: u64,
  pub grupo_codigo: String,
  pub grupo_nombre: String,
  pub tipo_acceso: String,
  pub color_hex: String,
  pub vigente: bool,
  pub fecha_asignacion: String,
  pub fecha_expiracion: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupsResponse {
  pub usuario_id: UserId,
  pub grupos: Vec<UserGroup>,
  pub total: usize,
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde_json::json;

  #[test]
  fn test_verify_response_origin_is_optional() {
    let with_origin: VerifyPermissionResponse = serde_json::from_value(json!({
      "usuario_id": 7,
      "capacidad_codigo": "sistema.vistas.dashboard.ver",
      "tiene_permiso": true,
      "origen": "excepcional_concedido"
    }))
    .unwrap();
    assert_eq!(with_origin.origen, Some(PermissionOrigin::ExcepcionalConcedido));

    let without: VerifyPermissionResponse = serde_json::from_value(json!({
      "usuario_id": 7,
      "capacidad_codigo": "x",
      "tiene_permiso": false
    }))
    .unwrap();
    assert_eq!(without.origen, None);
  }

  #[test]
  fn test_menu_tree_shape() {
    let menu: MenuResponse = serde_json::from_value(json!({
      "usuario_id": 7,
      "menu": {
        "vistas": { "dashboard": ["sistema.vistas.dashboard.ver"] }
      }
    }))
    .unwrap();
    assert_eq!(
      menu.menu["vistas"]["dashboard"],
      vec!["sistema.vistas.dashboard.ver".to_string()]
    );
  }

  #[test]
  fn test_capabilities_total_tracks_list() {
    let response = CapabilitiesResponse::new(3, vec!["a".into(), "b".into()]);
    assert_eq!(response.total, 2);
    assert!(response.contains("a"));
    assert!(!response.contains("c"));
  }
}

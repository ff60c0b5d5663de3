//! Flattened landscape returned to visualization clients

use crate::store::{Language, Metrics};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

/// Deterministic id derived from a name: UUID v5 in the URL namespace.
/// Clients cache these ids, so the derivation must not change.
pub fn stable_id(key: &str) -> String {
    Uuid::new_v5(&Uuid::NAMESPACE_URL, key.as_bytes()).to_string()
}

/// Append `id` unless already present
pub(crate) fn push_unique(ids: &mut Vec<String>, id: &str) {
    if !ids.iter().any(|existing| existing == id) {
        ids.push(id.to_string());
    }
}

/// All entities of one or more projected commits, keyed by id
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FlatLandscape {
    pub landscape_token: String,
    pub cities: BTreeMap<String, City>,
    pub districts: BTreeMap<String, District>,
    pub buildings: BTreeMap<String, Building>,
    pub classes: BTreeMap<String, Class>,
    pub functions: BTreeMap<String, Func>,
}

impl FlatLandscape {
    pub fn new(token: &str) -> Self {
        Self {
            landscape_token: token.to_string(),
            ..Default::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.cities.is_empty()
    }
}

/// Projection of a repository
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct City {
    pub id: String,
    pub name: String,
    /// Districts without a parent district
    pub root_district_ids: Vec<String>,
    /// Every district of the city
    pub district_ids: Vec<String>,
    pub building_ids: Vec<String>,
}

impl City {
    pub fn new(id: &str, name: &str) -> Self {
        Self {
            id: id.to_string(),
            name: name.to_string(),
            root_district_ids: Vec::new(),
            district_ids: Vec::new(),
            building_ids: Vec::new(),
        }
    }
}

/// Projection of a directory
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct District {
    pub id: String,
    pub name: String,
    pub fqn: String,
    pub parent_city_id: String,
    pub parent_district_id: Option<String>,
    pub district_ids: Vec<String>,
    pub building_ids: Vec<String>,
}

/// Projection of a file revision
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Building {
    pub id: String,
    pub name: String,
    pub fqn: String,
    pub parent_city_id: String,
    pub parent_district_id: String,
    pub language: Language,
    pub class_ids: Vec<String>,
    pub function_ids: Vec<String>,
    pub metrics: Metrics,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Class {
    pub id: String,
    /// Simple name, without package
    pub name: String,
    pub fqn: String,
    pub parent_building_id: String,
    pub function_ids: Vec<String>,
    pub metrics: Metrics,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Func {
    pub id: String,
    pub name: String,
    pub fqn: String,
    /// Owning class or building
    pub parent_id: String,
    pub metrics: Metrics,
}

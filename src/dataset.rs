//! In-memory dataset handed to the recommendation service at startup.
//!
//! Holds the rating matrix, the external ID <-> internal index mappings and
//! the item metadata. Loading these from files is the caller's concern.

use std::collections::{BTreeSet, HashMap};

use crate::errors::{ClusterError, ClusterResult};
use crate::types::{ItemRecord, RatingMatrix};

/// Bidirectional external identifier <-> matrix index tables
#[derive(Debug, Clone, Default, PartialEq)]
pub struct IdMappings {
    user_to_index: HashMap<String, usize>,
    index_to_user: HashMap<usize, String>,
    item_to_index: HashMap<String, usize>,
    index_to_item: HashMap<usize, String>,
}

impl IdMappings {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_user(&mut self, user_id: impl Into<String>, index: usize) {
        let user_id = user_id.into();
        self.index_to_user.insert(index, user_id.clone());
        self.user_to_index.insert(user_id, index);
    }

    pub fn insert_item(&mut self, item_id: impl Into<String>, index: usize) {
        let item_id = item_id.into();
        self.index_to_item.insert(index, item_id.clone());
        self.item_to_index.insert(item_id, index);
    }

    pub fn user_index(&self, user_id: &str) -> Option<usize> {
        self.user_to_index.get(user_id).copied()
    }

    pub fn user_id(&self, index: usize) -> Option<&str> {
        self.index_to_user.get(&index).map(String::as_str)
    }

    pub fn item_index(&self, item_id: &str) -> Option<usize> {
        self.item_to_index.get(item_id).copied()
    }

    pub fn item_id(&self, index: usize) -> Option<&str> {
        self.index_to_item.get(&index).map(String::as_str)
    }

    /// User identifiers in matrix row order
    pub fn user_ids(&self) -> Vec<String> {
        let mut users: Vec<(&usize, &String)> = self.index_to_user.iter().collect();
        users.sort_by_key(|(index, _)| **index);
        users.into_iter().map(|(_, id)| id.clone()).collect()
    }
}

/// Matrix, mappings and item catalogue
#[derive(Debug, Clone)]
pub struct Dataset {
    matrix: RatingMatrix,
    mappings: IdMappings,
    items: HashMap<String, ItemRecord>,
    genres: Vec<String>,
}

impl Dataset {
    /// Validate and assemble a dataset.
    ///
    /// Every mapped index must address a row or column of `matrix`. Item
    /// genres are stored lowercase and the distinct `|`-separated genre names
    /// are collected in sorted order.
    pub fn new(matrix: RatingMatrix, mappings: IdMappings, items: Vec<ItemRecord>) -> ClusterResult<Self> {
        if let Some((id, index)) = mappings
            .user_to_index
            .iter()
            .find(|(_, index)| **index >= matrix.num_users())
        {
            return Err(ClusterError::Config {
                message: format!("user {} maps to row {} but matrix has {} rows", id, index, matrix.num_users()),
            });
        }
        if let Some((id, index)) = mappings
            .item_to_index
            .iter()
            .find(|(_, index)| **index >= matrix.num_items())
        {
            return Err(ClusterError::Config {
                message: format!("item {} maps to column {} but matrix has {} columns", id, index, matrix.num_items()),
            });
        }

        let mut genres = BTreeSet::new();
        let items: HashMap<String, ItemRecord> = items
            .into_iter()
            .map(|mut item| {
                item.genre = item.genre.to_lowercase();
                genres.extend(
                    item.genre
                        .split('|')
                        .map(str::trim)
                        .filter(|g| !g.is_empty())
                        .map(String::from),
                );
                (item.item_id.clone(), item)
            })
            .collect();

        Ok(Self {
            matrix,
            mappings,
            items,
            genres: genres.into_iter().collect(),
        })
    }

    pub fn matrix(&self) -> &RatingMatrix {
        &self.matrix
    }

    pub fn mappings(&self) -> &IdMappings {
        &self.mappings
    }

    /// Item record for a matrix column, if the column is mapped and catalogued
    pub fn item_at(&self, index: usize) -> Option<&ItemRecord> {
        self.mappings.item_id(index).and_then(|id| self.items.get(id))
    }

    /// Items sorted by identifier, for seeding a store
    pub fn items_sorted(&self) -> Vec<ItemRecord> {
        let mut items: Vec<ItemRecord> = self.items.values().cloned().collect();
        items.sort_by(|a, b| a.item_id.cmp(&b.item_id));
        items
    }

    pub fn genres(&self) -> &[String] {
        &self.genres
    }
}

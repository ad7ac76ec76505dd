use sea_orm::entity::prelude::*;
use sea_orm::FromJsonQueryResult;
use serde::{Deserialize, Serialize};

use crate::entities::user::Entity as User;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize)]
#[sea_orm(table_name = "products")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    pub vendor_id: i32,
    pub name: String,
    /// Minor currency units.
    pub base_price: i64,
    #[sea_orm(column_type = "Json")]
    pub variants: VariantGroups,
    pub total_stock: i64,
    #[sea_orm(default = true)]
    pub is_active: bool,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "User",
        from = "crate::entities::product::Column::VendorId",
        to = "crate::entities::user::Column::Id",
        on_update = "Cascade",
        on_delete = "Restrict",
    )]
    Vendor,
}

impl ActiveModelBehavior for ActiveModel {}

impl Related<crate::entities::user::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Vendor.def()
    }
}

/// A named axis of configuration ("Size") and its concrete options.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct VariantGroup {
    pub name: String,
    pub options: Vec<VariantOption>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct VariantOption {
    pub value: String,
    #[serde(default)]
    pub price_modifier: i64,
    #[serde(default)]
    pub stock: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sku: Option<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize, FromJsonQueryResult)]
pub struct VariantGroups(pub Vec<VariantGroup>);

/// One chosen option for one variant group, as carried by cart lines and order items.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct VariantSelection {
    pub name: String,
    pub value: String,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize, FromJsonQueryResult)]
pub struct Selections(pub Vec<VariantSelection>);

impl Selections {
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// "Size: Large, Color: Red"
    pub fn describe(&self) -> String {
        self.0
            .iter()
            .map(|sel| format!("{}: {}", sel.name, sel.value))
            .collect::<Vec<_>>()
            .join(", ")
    }
}

impl<'a> IntoIterator for &'a Selections {
    type Item = &'a VariantSelection;
    type IntoIter = std::slice::Iter<'a, VariantSelection>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

impl Model {
    pub fn has_variants(&self) -> bool {
        !self.variants.0.is_empty()
    }

    /// Option matched by group name then option value. Unknown names yield `None`.
    pub fn find_option(&self, selection: &VariantSelection) -> Option<&VariantOption> {
        self.variants
            .0
            .iter()
            .find(|group| group.name == selection.name)?
            .options
            .iter()
            .find(|option| option.value == selection.value)
    }

    pub fn find_option_mut(&mut self, selection: &VariantSelection) -> Option<&mut VariantOption> {
        self.variants
            .0
            .iter_mut()
            .find(|group| group.name == selection.name)?
            .options
            .iter_mut()
            .find(|option| option.value == selection.value)
    }

    /// Keeps `total_stock` equal to the sum of all option stocks. Products without
    /// variants keep whatever aggregate they were given.
    pub fn recompute_total_stock(&mut self) {
        if self.has_variants() {
            self.total_stock = self
                .variants
                .0
                .iter()
                .flat_map(|group| group.options.iter())
                .map(|option| option.stock)
                .sum();
        }
    }
}

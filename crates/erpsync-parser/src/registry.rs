use crate::formats::schema::{
    ColumnMap, CUSTOMER_COLUMNS, INVENTORY_COLUMNS, PRODUCT_COLUMNS, SALES_COLUMNS,
    SELLER_COLUMNS,
};
use crate::model::{RawItem, Record, Value};

/// Entities exposed by the ERP API, each with its own column map.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ApiEntity {
    Products,
    Customers,
    Sellers,
    Inventory,
    Sales,
}

impl ApiEntity {
    pub fn name(&self) -> &'static str {
        match self {
            ApiEntity::Products => "products",
            ApiEntity::Customers => "customers",
            ApiEntity::Sellers => "sellers",
            ApiEntity::Inventory => "inventory",
            ApiEntity::Sales => "sales",
        }
    }

    pub fn columns(&self) -> ColumnMap {
        match self {
            ApiEntity::Products => PRODUCT_COLUMNS,
            ApiEntity::Customers => CUSTOMER_COLUMNS,
            ApiEntity::Sellers => SELLER_COLUMNS,
            ApiEntity::Inventory => INVENTORY_COLUMNS,
            ApiEntity::Sales => SALES_COLUMNS,
        }
    }

    /// Rename an API item into a canonical record. Only mapped fields are
    /// kept; fields the API omitted are Null.
    pub fn map_item(&self, item: &RawItem) -> Record {
        map_columns(item, self.columns())
    }

    pub fn map_items(&self, items: &[RawItem]) -> Vec<Record> {
        items.iter().map(|item| self.map_item(item)).collect()
    }
}

pub fn map_columns(item: &RawItem, columns: ColumnMap) -> Record {
    columns
        .iter()
        .map(|(api_field, field)| {
            let value = item.get(*api_field).map(Value::from_json).unwrap_or_default();
            (*field, value)
        })
        .collect()
}

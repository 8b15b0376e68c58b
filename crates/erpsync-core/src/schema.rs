//! Warehouse tables written or read by the loaders.

use crate::types::FieldKind;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ColumnSpec {
    pub name: &'static str,
    pub kind: FieldKind,
    pub nullable: bool,
}

const fn col(name: &'static str, kind: FieldKind) -> ColumnSpec {
    ColumnSpec {
        name,
        kind,
        nullable: false,
    }
}

const fn opt(name: &'static str, kind: FieldKind) -> ColumnSpec {
    ColumnSpec {
        name,
        kind,
        nullable: true,
    }
}

use FieldKind::{Bool, Date, Decimal, Int, Text, Timestamp};

#[derive(Debug, PartialEq, Eq)]
pub struct TableSpec {
    pub name: &'static str,
    /// Warehouse-assigned identity column, if any. Never written.
    pub surrogate: Option<&'static str>,
    pub columns: &'static [ColumnSpec],
    pub conflict_key: &'static [&'static str],
    /// Columns overwritten on conflict; empty means insert-if-absent.
    pub update_columns: &'static [&'static str],
}

impl TableSpec {
    pub fn column(&self, name: &str) -> Option<&ColumnSpec> {
        self.columns.iter().find(|column| column.name == name)
    }

    pub fn column_names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.columns.iter().map(|column| column.name)
    }

    /// Surrogate column first, then every written column.
    pub fn all_columns(&self) -> Vec<(&'static str, FieldKind)> {
        self.surrogate
            .map(|name| (name, Int))
            .into_iter()
            .chain(self.columns.iter().map(|column| (column.name, column.kind)))
            .collect()
    }
}

pub const PRODUCTS: TableSpec = TableSpec {
    name: "dim_products",
    surrogate: Some("id_product"),
    columns: &[
        col("product_code", Text),
        col("reference", Text),
        col("tenant", Text),
        opt("description", Text),
        opt("group_code", Text),
        opt("line_code", Text),
        opt("department_code", Text),
        opt("brand_name", Text),
        opt("brand_code", Text),
        opt("gross_weight", Decimal),
        opt("factor", Decimal),
        opt("vat_rate", Decimal),
        opt("average_cost", Decimal),
        opt("last_cost", Decimal),
    ],
    conflict_key: &["product_code", "reference", "tenant"],
    update_columns: &[
        "description",
        "group_code",
        "line_code",
        "department_code",
        "brand_name",
        "brand_code",
        "average_cost",
        "last_cost",
    ],
};

pub const CUSTOMERS: TableSpec = TableSpec {
    name: "dim_customers",
    surrogate: Some("id_customer"),
    columns: &[
        col("customer_code", Text),
        col("tenant", Text),
        opt("tax_id", Text),
        opt("name", Text),
        opt("classification_code", Text),
        opt("classification", Text),
        opt("address", Text),
        opt("phone", Text),
        opt("city_code", Text),
        opt("inactive", Text),
        opt("id_customer_master", Int),
    ],
    conflict_key: &["customer_code", "tenant"],
    update_columns: &[
        "tax_id",
        "name",
        "classification_code",
        "classification",
        "address",
        "phone",
        "city_code",
        "inactive",
    ],
};

pub const SELLERS_RAW: TableSpec = TableSpec {
    name: "api_sellers_raw",
    surrogate: None,
    columns: &[
        col("seller_code", Text),
        col("tenant", Text),
        opt("document_number", Text),
        opt("seller_name", Text),
    ],
    conflict_key: &[],
    update_columns: &[],
};

pub const WAREHOUSES: TableSpec = TableSpec {
    name: "dim_warehouses",
    surrogate: Some("id_warehouse"),
    columns: &[col("warehouse_code", Text), opt("warehouse_name", Text)],
    conflict_key: &["warehouse_code"],
    update_columns: &[],
};

pub const INVENTORY_CURRENT: TableSpec = TableSpec {
    name: "inventory_current",
    surrogate: None,
    columns: &[
        col("id_product", Int),
        col("id_warehouse", Int),
        col("tenant", Text),
        opt("quantity_available", Decimal),
        col("updated_at", Timestamp),
    ],
    conflict_key: &["id_product", "id_warehouse", "tenant"],
    update_columns: &["quantity_available", "updated_at"],
};

pub const INVENTORY_SNAPSHOTS: TableSpec = TableSpec {
    name: "fact_inventory",
    surrogate: None,
    columns: &[
        col("snapshot_date", Date),
        col("id_product", Int),
        col("id_warehouse", Int),
        col("tenant", Text),
        opt("quantity_available", Decimal),
    ],
    conflict_key: &["snapshot_date", "id_product", "id_warehouse", "tenant"],
    update_columns: &[],
};

pub const SALES: TableSpec = TableSpec {
    name: "fact_sales",
    surrogate: Some("id_sale"),
    columns: &[
        col("sale_date", Date),
        col("tenant", Text),
        col("id_product", Int),
        col("id_customer", Int),
        col("id_warehouse", Int),
        col("id_role_version", Int),
        opt("erp_transaction_id", Text),
        opt("invoice_number", Text),
        opt("product_code", Text),
        opt("reference", Text),
        opt("customer_code", Text),
        opt("seller_code", Text),
        opt("warehouse_code", Text),
        opt("quantity", Decimal),
        opt("base_amount", Decimal),
        opt("discount_amount", Decimal),
        opt("vat_amount", Decimal),
        opt("total_amount", Decimal),
        opt("total_cost", Decimal),
        opt("list_price", Decimal),
        opt("payment_method", Text),
        opt("price_list", Text),
        opt("notes", Text),
        opt("return_reason", Text),
        opt("store_order", Text),
    ],
    conflict_key: &[],
    update_columns: &[],
};

pub const PEOPLE: TableSpec = TableSpec {
    name: "dim_people",
    surrogate: Some("id_person"),
    columns: &[col("document_number", Text), opt("full_name", Text)],
    conflict_key: &["document_number"],
    update_columns: &["full_name"],
};

pub const SALES_ROLES: TableSpec = TableSpec {
    name: "dim_sales_roles",
    surrogate: Some("id_role_version"),
    columns: &[
        col("role_code", Text),
        col("tenant", Text),
        col("id_person", Int),
        opt("id_supervisor", Int),
        opt("position", Text),
        col("valid_from", Date),
        opt("valid_to", Date),
    ],
    conflict_key: &["role_code", "tenant", "valid_from"],
    update_columns: &["id_person", "id_supervisor", "position", "valid_to"],
};

pub const CUSTOMER_MASTER: TableSpec = TableSpec {
    name: "customer_master",
    surrogate: Some("id_customer_master"),
    columns: &[col("master_code", Text), opt("unified_name", Text)],
    conflict_key: &["master_code"],
    update_columns: &["unified_name"],
};

pub const CUSTOMER_CLASSIFICATION: TableSpec = TableSpec {
    name: "dim_customer_classification",
    surrogate: Some("id_classification"),
    columns: &[
        col("id_customer_master", Int),
        opt("channel", Text),
        opt("subchannel", Text),
        opt("branch", Text),
        opt("visit_day", Text),
        col("valid_from", Date),
        opt("valid_to", Date),
    ],
    conflict_key: &["id_customer_master", "valid_from"],
    update_columns: &["channel", "subchannel", "branch", "visit_day", "valid_to"],
};

pub const PRODUCT_MANAGEMENT: TableSpec = TableSpec {
    name: "product_management",
    surrogate: None,
    columns: &[
        col("id_product", Int),
        opt("category", Text),
        opt("subcategory_1", Text),
        opt("subcategory_2", Text),
        opt("guide_description", Text),
        opt("py_classification", Text),
        opt("py_equivalence", Text),
        opt("net_weight", Decimal),
    ],
    conflict_key: &["id_product"],
    update_columns: &[
        "category",
        "subcategory_1",
        "subcategory_2",
        "guide_description",
        "py_classification",
        "py_equivalence",
        "net_weight",
    ],
};

pub const LINES: TableSpec = TableSpec {
    name: "dim_lines",
    surrogate: None,
    columns: &[col("line_code", Text), opt("line_description", Text)],
    conflict_key: &["line_code"],
    update_columns: &[],
};

pub const BRANDS: TableSpec = TableSpec {
    name: "dim_brands",
    surrogate: None,
    columns: &[col("brand_code", Text), opt("brand_name", Text)],
    conflict_key: &["brand_code"],
    update_columns: &[],
};

pub const DEPARTMENTS: TableSpec = TableSpec {
    name: "dim_departments",
    surrogate: None,
    columns: &[
        col("department_code", Text),
        opt("department_description", Text),
    ],
    conflict_key: &["department_code"],
    update_columns: &[],
};

pub const GROUPS: TableSpec = TableSpec {
    name: "dim_groups",
    surrogate: None,
    columns: &[col("group_code", Text), opt("group_name", Text)],
    conflict_key: &["group_code"],
    update_columns: &[],
};

pub const CALENDAR: TableSpec = TableSpec {
    name: "dim_time",
    surrogate: None,
    columns: &[
        col("date_key", Date),
        col("year", Int),
        col("month", Int),
        col("month_name", Text),
        col("quarter", Int),
        col("bimester", Int),
        col("iso_week", Int),
        col("day_of_month", Int),
        col("day_name", Text),
        col("is_weekend", Bool),
        col("is_holiday", Bool),
        col("is_business_day", Bool),
        opt("business_day_of_month", Int),
        col("business_days_in_month", Int),
    ],
    conflict_key: &["date_key"],
    update_columns: &[
        "year",
        "month",
        "month_name",
        "quarter",
        "bimester",
        "iso_week",
        "day_of_month",
        "day_name",
        "is_weekend",
        "is_holiday",
        "is_business_day",
        "business_day_of_month",
        "business_days_in_month",
    ],
};

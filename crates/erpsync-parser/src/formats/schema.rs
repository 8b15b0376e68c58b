/// API field → canonical field, per extracted entity.
pub type ColumnMap = &'static [(&'static str, &'static str)];

pub const PRODUCT_COLUMNS: ColumnMap = &[
    ("OCODIGO", "product_code"),
    ("OREFERENCIA", "reference"),
    ("ODESCRIP", "description"),
    ("OCODGRUPO", "group_code"),
    ("OCODLINEA", "line_code"),
    ("ODEPARTAMENTOCODIGO", "department_code"),
    ("ONOMMARCA", "brand_name"),
    ("OPESO", "gross_weight"),
    ("OFACTOR", "factor"),
    ("OPORIVA", "vat_rate"),
    ("OULTIMOCOSTO", "last_cost"),
    ("OCOSTOPROMEDIO", "average_cost"),
];

pub const CUSTOMER_COLUMNS: ColumnMap = &[
    ("OCODIGO", "customer_code"),
    ("ONIT", "tax_id"),
    ("ONOMBRE", "name"),
    ("OCODCLASIFICACION1", "classification_code"),
    ("ONOMCLASIFICACION1", "classification"),
    ("ODIRECC1", "address"),
    ("OTELEF1", "phone"),
    ("OCODCIUDAD", "city_code"),
    ("OINACTIVO", "inactive"),
];

pub const SELLER_COLUMNS: ColumnMap = &[
    ("OCODIGO", "seller_code"),
    ("ONIT", "document_number"),
    ("ONOMBRE", "seller_name"),
    ("OINACTIVO", "inactive"),
];

pub const INVENTORY_COLUMNS: ColumnMap = &[
    ("OCODIGO", "product_code"),
    ("OREFERENCIA", "reference"),
    ("OCODBODEGA", "warehouse_code"),
    ("OEXISTENCIA", "quantity_available"),
];

pub const SALES_COLUMNS: ColumnMap = &[
    ("DEKARDEXID", "erp_transaction_id"),
    ("NUMFACTURA", "invoice_number"),
    ("FECHA", "sale_date_raw"),
    ("CODCLIENTE", "customer_code"),
    ("CODIGO", "product_code"),
    ("REFERENCIA", "reference"),
    ("CODVENDEDOR", "seller_code"),
    ("CANT", "quantity"),
    ("PREBASE", "base_amount"),
    ("DESCUENTO", "discount_amount"),
    ("PREIVA", "vat_amount"),
    ("PRECIOTOT", "total_amount"),
    ("COSTOPROMEDIO", "total_cost"),
    ("PRECIOLISTA", "list_price"),
    ("FORMAPAGO", "payment_method"),
    ("CODBODEGA", "warehouse_code"),
    ("LISTAPRECIO", "price_list"),
    ("OBSERV", "notes"),
    ("MOTIVODEVOLUCION", "return_reason"),
    ("PEDIDO", "store_order"),
];

/// Nested per-warehouse stock array on product items.
pub const INVENTORY_RECORD_PATH: &str = "Bodegas";
/// Nested price-list array on product items.
pub const PRICE_LIST_PATH: &str = "Items";
pub const PRICE_LIST_CODE: &str = "OCODLISTA";

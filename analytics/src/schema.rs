use arrow::datatypes::{DataType, Field, Schema, SchemaRef, TimeUnit};
use common::model::{
    COL_DATE, COL_FAILURE_TIME, COL_FAILURES, COL_HOURS, COL_MACHINE, COL_PRODUCTION,
};
use lazy_static::lazy_static;
use std::sync::Arc;

pub const COL_FAILURE_RATE: &str = "falhas_por_hora";
pub const COL_WEEK: &str = "semana";
pub const COL_MONTH: &str = "mes";
pub const COL_FORECAST_VALUE: &str = "producao_prevista";

// Stored relation, as typed after a read
pub fn production_schema() -> Schema {
    Schema::new(vec![
        Field::new(COL_MACHINE, DataType::Utf8, false),
        Field::new(COL_DATE, DataType::Date32, false),
        Field::new(COL_HOURS, DataType::Float64, false),
        Field::new(COL_FAILURES, DataType::Int64, false),
        Field::new(COL_PRODUCTION, DataType::Float64, false),
        Field::new(
            COL_FAILURE_TIME,
            DataType::Timestamp(TimeUnit::Millisecond, None),
            true,
        ),
    ])
}

// Cleaned dataset: stored columns plus derived metrics and buckets
pub fn cleaned_schema() -> Schema {
    let production = production_schema();
    let mut fields: Vec<Field> = production
        .fields()
        .iter()
        .map(|f| f.as_ref().clone())
        .collect();
    fields.push(Field::new(COL_FAILURE_RATE, DataType::Float64, false));
    fields.push(Field::new(COL_WEEK, DataType::Date32, false));
    fields.push(Field::new(COL_MONTH, DataType::Utf8, false));
    Schema::new(fields)
}

pub fn forecast_schema() -> Schema {
    Schema::new(vec![
        Field::new(COL_MACHINE, DataType::Utf8, false),
        Field::new(COL_MONTH, DataType::Utf8, false),
        Field::new(COL_FORECAST_VALUE, DataType::Float64, false),
    ])
}

pub enum TableSchema {
    Cleaned,
    Forecast,
}

pub fn get_schema(version: TableSchema) -> SchemaRef {
    match version {
        TableSchema::Cleaned => CLEANED_SCHEMA.clone(),
        TableSchema::Forecast => FORECAST_SCHEMA.clone(),
    }
}

// Lazy-loaded static schemas
lazy_static! {
    static ref CLEANED_SCHEMA: SchemaRef = Arc::new(cleaned_schema());
    static ref FORECAST_SCHEMA: SchemaRef = Arc::new(forecast_schema());
}

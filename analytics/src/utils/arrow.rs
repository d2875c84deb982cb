use arrow::array::{Array, ArrayRef, AsArray};
use arrow::compute::{cast, concat_batches};
use arrow::datatypes::{DataType, Date32Type, Float64Type, Int64Type, SchemaRef};
use arrow::record_batch::RecordBatch;
use chrono::{Datelike, NaiveDate};
use common::{Error, Result};

/// Days from 0001-01-01 to 1970-01-01, the Date32 epoch.
const EPOCH_DAYS_FROM_CE: i32 = 719_163;

pub fn date_to_days(date: NaiveDate) -> i32 {
    date.num_days_from_ce() - EPOCH_DAYS_FROM_CE
}

pub fn days_to_date(days: i32) -> Option<NaiveDate> {
    NaiveDate::from_num_days_from_ce_opt(days + EPOCH_DAYS_FROM_CE)
}

/// Collapses query output into one batch; no batches yields an empty one
/// with the given schema.
pub fn single_batch(schema: SchemaRef, batches: &[RecordBatch]) -> Result<RecordBatch> {
    match batches {
        [] => Ok(RecordBatch::new_empty(schema)),
        [only] => Ok(only.clone()),
        [first, ..] => Ok(concat_batches(&first.schema(), batches)?),
    }
}

fn column_as(batch: &RecordBatch, name: &str, to: &DataType) -> Result<ArrayRef> {
    let index = batch.schema().index_of(name)?;
    let column = batch.column(index);
    if column.data_type() == to {
        return Ok(column.clone());
    }
    Ok(cast(column, to)?)
}

pub fn string_column(batch: &RecordBatch, name: &str) -> Result<Vec<Option<String>>> {
    let array = column_as(batch, name, &DataType::Utf8)?;
    let strings = array
        .as_string_opt::<i32>()
        .ok_or_else(|| Error::Other(format!("Failed to read column {} as Utf8", name)))?;
    Ok(strings.iter().map(|v| v.map(str::to_string)).collect())
}

pub fn f64_column(batch: &RecordBatch, name: &str) -> Result<Vec<Option<f64>>> {
    let array = column_as(batch, name, &DataType::Float64)?;
    let values = array
        .as_primitive_opt::<Float64Type>()
        .ok_or_else(|| Error::Other(format!("Failed to read column {} as Float64", name)))?;
    Ok(values.iter().collect())
}

pub fn i64_column(batch: &RecordBatch, name: &str) -> Result<Vec<Option<i64>>> {
    let array = column_as(batch, name, &DataType::Int64)?;
    let values = array
        .as_primitive_opt::<Int64Type>()
        .ok_or_else(|| Error::Other(format!("Failed to read column {} as Int64", name)))?;
    Ok(values.iter().collect())
}

pub fn date_column(batch: &RecordBatch, name: &str) -> Result<Vec<Option<NaiveDate>>> {
    let array = column_as(batch, name, &DataType::Date32)?;
    let values = array
        .as_primitive_opt::<Date32Type>()
        .ok_or_else(|| Error::Other(format!("Failed to read column {} as Date32", name)))?;
    Ok(values.iter().map(|v| v.and_then(days_to_date)).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use arrow::array::{Float64Array, Int64Array, StringArray};
    use arrow::datatypes::{Field, Schema};
    use std::sync::Arc;

    #[test]
    fn test_date32_conversion() {
        let epoch = NaiveDate::from_ymd_opt(1970, 1, 1).unwrap();
        assert_eq!(date_to_days(epoch), 0);
        let day = NaiveDate::from_ymd_opt(2024, 12, 31).unwrap();
        assert_eq!(days_to_date(date_to_days(day)), Some(day));
    }

    #[test]
    fn test_columns_are_cast_on_read() {
        let schema = Arc::new(Schema::new(vec![
            Field::new("maquina", DataType::Utf8, false),
            Field::new("falhas", DataType::Int64, true),
            Field::new("producao", DataType::Float64, false),
        ]));
        let batch = RecordBatch::try_new(
            schema,
            vec![
                Arc::new(StringArray::from(vec!["A1", "B1"])),
                Arc::new(Int64Array::from(vec![Some(3), None])),
                Arc::new(Float64Array::from(vec![1.5, 2.0])),
            ],
        )
        .unwrap();

        assert_eq!(
            string_column(&batch, "maquina").unwrap(),
            vec![Some("A1".to_string()), Some("B1".to_string())]
        );
        assert_eq!(f64_column(&batch, "falhas").unwrap(), vec![Some(3.0), None]);
        assert_eq!(i64_column(&batch, "falhas").unwrap(), vec![Some(3), None]);
        assert!(string_column(&batch, "absent").is_err());
    }

    #[test]
    fn test_single_batch_of_nothing_is_empty() {
        let schema = Arc::new(Schema::new(vec![Field::new("x", DataType::Int64, false)]));
        let batch = single_batch(schema, &[]).unwrap();
        assert_eq!(batch.num_rows(), 0);
        assert_eq!(batch.num_columns(), 1);
    }
}

use model::row::{SqlRow, SqlValue};
use mysql_async::{Row as MySqlRow, Value};

/// Converts a driver row into the driver-agnostic representation consumed by
/// the typed record mappers.
pub fn to_sql_row(row: &MySqlRow) -> SqlRow {
    let mut sql_row = SqlRow::default();
    for (index, column) in row.columns_ref().iter().enumerate() {
        let value = row
            .as_ref(index)
            .map(convert_value)
            .unwrap_or(SqlValue::Null);
        sql_row.push(column.name_str().to_string(), value);
    }
    sql_row
}

fn convert_value(value: &Value) -> SqlValue {
    match value {
        Value::NULL => SqlValue::Null,
        Value::Int(v) => SqlValue::Int(*v),
        Value::UInt(v) => SqlValue::UInt(*v),
        Value::Float(v) => SqlValue::Float(*v as f64),
        Value::Double(v) => SqlValue::Float(*v),
        Value::Bytes(bytes) => match std::str::from_utf8(bytes) {
            Ok(s) => SqlValue::Str(s.to_string()),
            Err(_) => SqlValue::Bytes(bytes.clone()),
        },
        Value::Date(year, month, day, hour, minute, second, micros) => SqlValue::Str(format!(
            "{year:04}-{month:02}-{day:02} {hour:02}:{minute:02}:{second:02}.{micros:06}"
        )),
        Value::Time(negative, days, hours, minutes, seconds, micros) => {
            let sign = if *negative { "-" } else { "" };
            let total_hours = u32::from(*hours) + days * 24;
            SqlValue::Str(format!(
                "{sign}{total_hours:02}:{minutes:02}:{seconds:02}.{micros:06}"
            ))
        }
    }
}

//! Declared record shapes for known tables and the strict coercion layer.
//!
//! A [`TableSchema`] lists the fields a table is expected to carry and the
//! type each raw CSV cell is coerced to. Columns a schema does not declare
//! pass through unchanged, and tables without a schema are served as strings.
use std::collections::HashMap;

use serde_json::{Number, Value};

use crate::core::dates;
use crate::core::error::{Error, ErrorKind};
use crate::core::loader::Record;

const BOOL_TRUE: &[&str] = &["true", "True", "TRUE", "1", "yes", "Yes", "Y"];
const BOOL_FALSE: &[&str] = &["false", "False", "FALSE", "0", "no", "No", "N"];

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum FieldType {
    String,
    Integer,
    Float,
    Boolean,
    Date,
    DateTime,
}

impl FieldType {
    pub fn as_str(self) -> &'static str {
        match self {
            FieldType::String => "string",
            FieldType::Integer => "integer",
            FieldType::Float => "float",
            FieldType::Boolean => "boolean",
            FieldType::Date => "date",
            FieldType::DateTime => "datetime",
        }
    }

    /// Coerces one non-empty raw cell. The error is a short reason suitable
    /// for an error message.
    pub fn coerce(self, raw: &str) -> Result<Value, &'static str> {
        match self {
            FieldType::String => Ok(Value::String(raw.to_string())),
            FieldType::Integer => raw
                .parse::<i64>()
                .map(Value::from)
                .map_err(|_| "value is not an integer"),
            FieldType::Float => raw
                .parse::<f64>()
                .ok()
                .and_then(Number::from_f64)
                .map(Value::Number)
                .ok_or("value is not a finite number"),
            FieldType::Boolean => {
                if BOOL_TRUE.contains(&raw) {
                    Ok(Value::Bool(true))
                } else if BOOL_FALSE.contains(&raw) {
                    Ok(Value::Bool(false))
                } else {
                    Err("value is not a boolean")
                }
            }
            FieldType::Date => dates::parse_date(raw)
                .and_then(dates::format_date)
                .map(Value::String)
                .ok_or("value is not a date"),
            FieldType::DateTime => dates::parse_datetime(raw)
                .and_then(dates::format_datetime)
                .map(Value::String)
                .ok_or("value is not a datetime"),
        }
    }
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct FieldSpec {
    pub name: String,
    pub field_type: FieldType,
    pub required: bool,
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct TableSchema {
    table: String,
    fields: Vec<FieldSpec>,
}

impl TableSchema {
    pub fn new(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            fields: Vec::new(),
        }
    }

    pub fn field(mut self, name: impl Into<String>, field_type: FieldType) -> Self {
        self.fields.push(FieldSpec {
            name: name.into(),
            field_type,
            required: false,
        });
        self
    }

    pub fn required(mut self, name: impl Into<String>, field_type: FieldType) -> Self {
        self.fields.push(FieldSpec {
            name: name.into(),
            field_type,
            required: true,
        });
        self
    }

    pub fn get(&self, name: &str) -> Option<&FieldSpec> {
        self.fields.iter().find(|field| field.name == name)
    }

    /// Fails when a required field is absent from the file header. Runs once
    /// per load so header-only files are checked too.
    pub fn check_header(&self, columns: &[String]) -> Result<(), Error> {
        let missing = self
            .fields
            .iter()
            .filter(|spec| spec.required)
            .find(|spec| !columns.iter().any(|column| *column == spec.name));
        match missing {
            Some(spec) => Err(Error::new(ErrorKind::Validation)
                .with_message("required field is missing from the header")
                .with_table(self.table.clone())
                .with_field(spec.name.clone())),
            None => Ok(()),
        }
    }

    /// Coerces `record` in place of the raw strings. `row` is the 1-based
    /// data row, used only for error context.
    pub fn validate(&self, row: u64, mut record: Record) -> Result<Record, Error> {
        for spec in self.fields.iter().filter(|spec| spec.required) {
            if matches!(record.get(&spec.name), None | Some(Value::Null)) {
                return Err(self
                    .error(row, &spec.name)
                    .with_message("required field is empty"));
            }
        }

        for (name, value) in record.iter_mut() {
            let Some(spec) = self.get(name) else {
                continue;
            };
            let Value::String(raw) = &*value else {
                continue;
            };
            let coerced = spec.field_type.coerce(raw).map_err(|reason| {
                self.error(row, name)
                    .with_message(format!("{reason} ({}): {raw:?}", spec.field_type.as_str()))
            })?;
            *value = coerced;
        }
        Ok(record)
    }

    fn error(&self, row: u64, field: &str) -> Error {
        Error::new(ErrorKind::Validation)
            .with_table(self.table.clone())
            .with_row(row)
            .with_field(field)
    }
}

#[derive(Clone, Debug, Default)]
pub struct SchemaRegistry {
    schemas: HashMap<String, TableSchema>,
}

impl SchemaRegistry {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Declarations for the four logistics tables served by default.
    pub fn builtin() -> Self {
        use FieldType::*;

        let mut registry = Self::empty();
        registry.insert(
            TableSchema::new("delivery_events")
                .required("event_id", String)
                .field("load_id", String)
                .field("trip_id", String)
                .field("event_type", String)
                .field("facility_id", String)
                .field("scheduled_datetime", DateTime)
                .field("actual_datetime", DateTime)
                .field("detention_minutes", Integer)
                .field("on_time_flag", Boolean)
                .field("location_city", String)
                .field("location_state", String),
        );
        registry.insert(
            TableSchema::new("fuel_purchases")
                .required("fuel_purchase_id", String)
                .field("trip_id", String)
                .field("truck_id", String)
                .field("driver_id", String)
                .field("purchase_date", DateTime)
                .field("location_city", String)
                .field("location_state", String)
                .field("gallons", Float)
                .field("price_per_gallon", Float)
                .field("total_cost", Float)
                .field("fuel_card_number", String),
        );
        registry.insert(
            TableSchema::new("safety_incidents")
                .required("incident_id", String)
                .field("trip_id", String)
                .field("truck_id", String)
                .field("driver_id", String)
                .field("incident_date", DateTime)
                .field("incident_type", String)
                .field("location_city", String)
                .field("location_state", String)
                .field("at_fault_flag", Boolean)
                .field("injury_flag", Boolean)
                .field("vehicle_damage_cost", Float)
                .field("cargo_damage_cost", Float)
                .field("claim_amount", Float)
                .field("preventable_flag", Boolean)
                .field("description", String),
        );
        registry.insert(
            TableSchema::new("maintenance_records")
                .required("maintenance_id", String)
                .field("truck_id", String)
                .field("maintenance_date", Date)
                .field("maintenance_type", String)
                .field("odometer_reading", Integer)
                .field("labor_hours", Float)
                .field("labor_cost", Float)
                .field("parts_cost", Float)
                .field("total_cost", Float)
                .field("facility_location", String)
                .field("downtime_hours", Float)
                .field("service_description", String),
        );
        registry
    }

    pub fn insert(&mut self, schema: TableSchema) {
        self.schemas.insert(schema.table.clone(), schema);
    }

    pub fn get(&self, table: &str) -> Option<&TableSchema> {
        self.schemas.get(table)
    }

    pub fn check_header(&self, table: &str, columns: &[String]) -> Result<(), Error> {
        match self.get(table) {
            Some(schema) => schema.check_header(columns),
            None => Ok(()),
        }
    }

    /// Runs the table's schema over `record`; undeclared tables pass through.
    pub fn validate(&self, table: &str, row: u64, record: Record) -> Result<Record, Error> {
        match self.get(table) {
            Some(schema) => schema.validate(row, record),
            None => Ok(record),
        }
    }
}

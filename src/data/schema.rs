use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Schema descriptor
// ---------------------------------------------------------------------------

/// Where the reference date of each record comes from.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TimestampSource {
    /// Integer year and month columns; the day is fixed to 1.
    YearMonth { year: String, month: String },
    /// A date column parsed with a `chrono` format string. When set,
    /// `year_column` / `month_column` receive the derived integer parts.
    Date {
        column: String,
        #[serde(default = "default_date_format")]
        format: String,
        #[serde(default)]
        year_column: Option<String>,
        #[serde(default)]
        month_column: Option<String>,
    },
}

fn default_date_format() -> String {
    "%Y-%m-%d".to_string()
}

fn default_delimiter() -> char {
    ','
}

/// Describes the column layout of one source table.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Schema {
    /// Name used in log and error messages.
    pub name: String,
    /// Columns that must be present in the source header.
    pub required: Vec<String>,
    /// Columns always read as text (e.g. model "208" must stay a string).
    #[serde(default)]
    pub text_columns: Vec<String>,
    pub brand: String,
    pub model: String,
    /// Column holding the positive price used by the price metrics.
    pub price: String,
    /// Vehicle model year, when the layout has one.
    #[serde(default)]
    pub model_year: Option<String>,
    pub timestamp: TimestampSource,
    /// Name of the derived date column added to every record.
    pub date_column: String,
    #[serde(default = "default_delimiter")]
    pub delimiter: char,
}

impl Schema {
    /// Whether a column must be read as text.
    pub fn is_text_column(&self, column: &str) -> bool {
        self.text_columns.iter().any(|c| c == column)
    }

    /// Columns the loader derives, in the order they are appended.
    pub fn derived_columns(&self) -> Vec<String> {
        let mut derived = vec![self.date_column.clone()];
        if let TimestampSource::Date {
            year_column,
            month_column,
            ..
        } = &self.timestamp
        {
            derived.extend(year_column.iter().cloned());
            derived.extend(month_column.iter().cloned());
        }
        derived
    }

    /// Source columns holding whole numbers: the model year and the
    /// year/month parts of the reference date.
    pub fn integer_columns(&self) -> Vec<&str> {
        let mut columns: Vec<&str> = self.model_year.iter().map(String::as_str).collect();
        if let TimestampSource::YearMonth { year, month } = &self.timestamp {
            columns.push(year);
            columns.push(month);
        }
        columns
    }

    /// Source header order followed by any derived column not already present.
    pub fn output_columns(&self, headers: &[String]) -> Vec<String> {
        let mut columns = headers.to_vec();
        for col in self.derived_columns() {
            if !columns.contains(&col) {
                columns.push(col);
            }
        }
        columns
    }

    /// Required columns absent from `headers`, in declaration order.
    pub fn missing_columns(&self, headers: &[String]) -> Vec<String> {
        self.required
            .iter()
            .filter(|col| !headers.contains(col))
            .cloned()
            .collect()
    }
}

// ---------------------------------------------------------------------------
// Built-in layouts
// ---------------------------------------------------------------------------

/// The built-in vehicle table layouts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SchemaVariant {
    /// FIPE price history: one row per model, model year and reference month.
    #[default]
    PriceHistory,
    /// Monthly sales per model and state with integer `ano`/`mes` columns.
    Sales,
    /// Sales layout keyed by a `mes_ano` date column; `ano`/`mes` are derived.
    SalesDated,
}

fn strings(cols: &[&str]) -> Vec<String> {
    cols.iter().map(|c| c.to_string()).collect()
}

impl SchemaVariant {
    pub fn schema(self) -> Schema {
        match self {
            SchemaVariant::PriceHistory => Schema {
                name: "price_history".to_string(),
                required: strings(&[
                    "marca",
                    "modelo",
                    "anoModelo",
                    "mesReferencia",
                    "anoReferencia",
                    "valor",
                ]),
                text_columns: strings(&["marca", "modelo"]),
                brand: "marca".to_string(),
                model: "modelo".to_string(),
                price: "valor".to_string(),
                model_year: Some("anoModelo".to_string()),
                timestamp: TimestampSource::YearMonth {
                    year: "anoReferencia".to_string(),
                    month: "mesReferencia".to_string(),
                },
                date_column: "data".to_string(),
                delimiter: ',',
            },
            SchemaVariant::Sales => Schema {
                name: "sales".to_string(),
                required: strings(&[
                    "marca",
                    "modelo",
                    "regiao",
                    "estado",
                    "combustivel",
                    "categoria",
                    "ano",
                    "mes",
                    "vendas",
                    "faturamento",
                    "preco_medio",
                ]),
                text_columns: strings(&[
                    "marca",
                    "modelo",
                    "regiao",
                    "estado",
                    "combustivel",
                    "categoria",
                ]),
                brand: "marca".to_string(),
                model: "modelo".to_string(),
                price: "preco_medio".to_string(),
                model_year: None,
                timestamp: TimestampSource::YearMonth {
                    year: "ano".to_string(),
                    month: "mes".to_string(),
                },
                date_column: "mes_ano".to_string(),
                delimiter: ',',
            },
            SchemaVariant::SalesDated => {
                let mut schema = SchemaVariant::Sales.schema();
                schema.name = "sales_dated".to_string();
                schema.required.retain(|c| c != "ano" && c != "mes");
                schema.required.push("mes_ano".to_string());
                schema.timestamp = TimestampSource::Date {
                    column: "mes_ano".to_string(),
                    format: default_date_format(),
                    year_column: Some("ano".to_string()),
                    month_column: Some("mes".to_string()),
                };
                schema
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_columns_in_declaration_order() {
        let schema = SchemaVariant::PriceHistory.schema();
        let headers = strings(&["marca", "anoModelo", "valor"]);
        assert_eq!(
            schema.missing_columns(&headers),
            strings(&["modelo", "mesReferencia", "anoReferencia"])
        );
    }

    #[test]
    fn test_sales_dated_derives_year_and_month() {
        let schema = SchemaVariant::SalesDated.schema();
        assert!(schema.required.contains(&"mes_ano".to_string()));
        assert!(!schema.required.contains(&"ano".to_string()));
        let headers = schema.required.clone();
        let columns = schema.output_columns(&headers);
        assert!(columns.ends_with(&strings(&["ano", "mes"])));
        // mes_ano is both source and derived column, listed once
        assert_eq!(columns.iter().filter(|c| *c == "mes_ano").count(), 1);
    }

    #[test]
    fn test_integer_columns() {
        assert_eq!(
            SchemaVariant::PriceHistory.schema().integer_columns(),
            vec!["anoModelo", "anoReferencia", "mesReferencia"]
        );
        assert_eq!(SchemaVariant::Sales.schema().integer_columns(), vec!["ano", "mes"]);
        assert!(SchemaVariant::SalesDated.schema().integer_columns().is_empty());
    }

    #[test]
    fn test_schema_from_toml() {
        let text = r#"
            name = "custom"
            required = ["brand", "model", "price", "when"]
            brand = "brand"
            model = "model"
            price = "price"
            date_column = "when"
            delimiter = ";"

            [timestamp]
            kind = "date"
            column = "when"
        "#;
        let schema: Schema = toml::from_str(text).unwrap();
        assert_eq!(schema.delimiter, ';');
        assert!(schema.model_year.is_none());
        assert_eq!(
            schema.timestamp,
            TimestampSource::Date {
                column: "when".to_string(),
                format: "%Y-%m-%d".to_string(),
                year_column: None,
                month_column: None,
            }
        );
    }
}

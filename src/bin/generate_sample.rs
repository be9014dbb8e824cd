use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use arrow::array::{Float64Array, Int64Array, StringArray};
use arrow::datatypes::{DataType, Field, Schema};
use arrow::record_batch::RecordBatch;
use arrow::util::pretty::pretty_format_batches;
use log::info;
use parquet::arrow::ArrowWriter;
use serde::Serialize;

/// Minimal deterministic PRNG (xoshiro256**)
struct SimpleRng {
    state: [u64; 4],
}

impl SimpleRng {
    fn new(seed: u64) -> Self {
        let mut s = [0u64; 4];
        let mut x = seed;
        for slot in &mut s {
            x = x.wrapping_mul(6364136223846793005).wrapping_add(1);
            *slot = x;
        }
        SimpleRng { state: s }
    }

    fn next_u64(&mut self) -> u64 {
        let result = (self.state[1].wrapping_mul(5))
            .rotate_left(7)
            .wrapping_mul(9);
        let t = self.state[1] << 17;
        self.state[2] ^= self.state[0];
        self.state[3] ^= self.state[1];
        self.state[1] ^= self.state[2];
        self.state[0] ^= self.state[3];
        self.state[2] ^= t;
        self.state[3] = self.state[3].rotate_left(45);
        result
    }

    fn next_f64(&mut self) -> f64 {
        (self.next_u64() >> 11) as f64 / (1u64 << 53) as f64
    }

    /// Box-Muller transform for normal distribution
    fn gauss(&mut self, mean: f64, std_dev: f64) -> f64 {
        let u1 = self.next_f64().max(1e-15);
        let u2 = self.next_f64();
        let z = (-2.0 * u1.ln()).sqrt() * (2.0 * std::f64::consts::PI * u2).cos();
        mean + std_dev * z
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct PriceRow {
    marca: String,
    modelo: String,
    ano_modelo: i64,
    mes_referencia: i64,
    ano_referencia: i64,
    valor: f64,
}

#[derive(Serialize)]
struct SalesRow {
    marca: String,
    modelo: String,
    regiao: String,
    estado: String,
    combustivel: String,
    categoria: String,
    ano: i64,
    mes: i64,
    vendas: i64,
    faturamento: f64,
    preco_medio: f64,
}

/// (brand, model, base price in 2020, yearly drift)
const CATALOG: &[(&str, &str, f64, f64)] = &[
    ("Toyota", "Corolla", 110_000.0, 0.08),
    ("Toyota", "Hilux", 210_000.0, 0.10),
    ("Toyota", "Etios", 55_000.0, 0.05),
    ("Volkswagen", "Gol", 45_000.0, 0.07),
    ("Volkswagen", "Polo", 70_000.0, 0.06),
    ("Volkswagen", "T-Cross", 105_000.0, 0.04),
    ("Honda", "Civic", 115_000.0, 0.09),
    ("Honda", "Fit", 72_000.0, 0.11),
    ("Honda", "HR-V", 120_000.0, 0.05),
    ("Chevrolet", "Onix", 60_000.0, 0.10),
    ("Fiat", "Strada", 75_000.0, 0.12),
    ("Fiat", "Mobi", 42_000.0, 0.03),
];

const STATES: &[(&str, &str)] = &[
    ("Sudeste", "SP"),
    ("Sudeste", "RJ"),
    ("Sul", "PR"),
    ("Nordeste", "BA"),
];

fn price_history(rng: &mut SimpleRng) -> Vec<PriceRow> {
    let mut rows = Vec::new();
    for &(brand, model, base, drift) in CATALOG {
        for model_year in 2019..=2024i64 {
            let age_discount = 1.0 - 0.06 * (2024 - model_year) as f64;
            for ref_year in model_year.max(2020)..=2024i64 {
                for month in 1..=12i64 {
                    let elapsed = (ref_year - 2020) as f64 + (month - 1) as f64 / 12.0;
                    let noise = rng.gauss(1.0, 0.01);
                    let price = base * age_discount * (1.0 + drift).powf(elapsed) * noise;
                    rows.push(PriceRow {
                        marca: brand.to_string(),
                        modelo: model.to_string(),
                        ano_modelo: model_year,
                        mes_referencia: month,
                        ano_referencia: ref_year,
                        valor: (price * 100.0).round() / 100.0,
                    });
                }
            }
        }
    }
    rows
}

fn sales(rng: &mut SimpleRng) -> Vec<SalesRow> {
    let mut rows = Vec::new();
    for &(brand, model, base, _) in CATALOG {
        let (fuel, category) = match model {
            "Hilux" => ("Diesel", "Picape"),
            "Strada" => ("Flex", "Picape"),
            "T-Cross" | "HR-V" => ("Flex", "SUV"),
            _ => ("Flex", "Hatch"),
        };
        for &(region, state) in STATES {
            for year in 2022..=2024i64 {
                for month in 1..=12i64 {
                    let units = rng.gauss(300.0, 60.0).max(0.0).round() as i64;
                    let avg_price = (base * rng.gauss(1.0, 0.02) * 100.0).round() / 100.0;
                    rows.push(SalesRow {
                        marca: brand.to_string(),
                        modelo: model.to_string(),
                        regiao: region.to_string(),
                        estado: state.to_string(),
                        combustivel: fuel.to_string(),
                        categoria: category.to_string(),
                        ano: year,
                        mes: month,
                        vendas: units,
                        faturamento: units as f64 * avg_price,
                        preco_medio: avg_price,
                    });
                }
            }
        }
    }
    rows
}

fn write_csv<T: Serialize>(path: &Path, rows: &[T]) -> Result<()> {
    let mut writer = csv::Writer::from_path(path)
        .with_context(|| format!("creating {}", path.display()))?;
    for row in rows {
        writer.serialize(row)?;
    }
    writer.flush()?;
    Ok(())
}

fn write_price_parquet(path: &Path, rows: &[PriceRow]) -> Result<()> {
    let schema = Arc::new(Schema::new(vec![
        Field::new("marca", DataType::Utf8, false),
        Field::new("modelo", DataType::Utf8, false),
        Field::new("anoModelo", DataType::Int64, false),
        Field::new("mesReferencia", DataType::Int64, false),
        Field::new("anoReferencia", DataType::Int64, false),
        Field::new("valor", DataType::Float64, false),
    ]));

    let batch = RecordBatch::try_new(
        schema.clone(),
        vec![
            Arc::new(StringArray::from_iter_values(rows.iter().map(|r| r.marca.as_str()))),
            Arc::new(StringArray::from_iter_values(rows.iter().map(|r| r.modelo.as_str()))),
            Arc::new(Int64Array::from_iter_values(rows.iter().map(|r| r.ano_modelo))),
            Arc::new(Int64Array::from_iter_values(rows.iter().map(|r| r.mes_referencia))),
            Arc::new(Int64Array::from_iter_values(rows.iter().map(|r| r.ano_referencia))),
            Arc::new(Float64Array::from_iter_values(rows.iter().map(|r| r.valor))),
        ],
    )
    .context("building record batch")?;

    info!("Preview:\n{}", pretty_format_batches(&[batch.slice(0, batch.num_rows().min(3))])?);

    let file = std::fs::File::create(path)
        .with_context(|| format!("creating {}", path.display()))?;
    let mut writer = ArrowWriter::try_new(file, schema, None)?;
    writer.write(&batch)?;
    writer.close()?;
    Ok(())
}

fn main() -> Result<()> {
    env_logger::init();

    let out_dir = PathBuf::from(std::env::args().nth(1).unwrap_or_else(|| ".".to_string()));
    std::fs::create_dir_all(&out_dir)
        .with_context(|| format!("creating {}", out_dir.display()))?;

    let mut rng = SimpleRng::new(42);

    let prices = price_history(&mut rng);
    let csv_path = out_dir.join("tabela-fipe-historico-precos.csv");
    write_csv(&csv_path, &prices)?;
    let parquet_path = out_dir.join("tabela-fipe-historico-precos.parquet");
    write_price_parquet(&parquet_path, &prices)?;
    info!("Wrote {} price records to {} and {}", prices.len(), csv_path.display(), parquet_path.display());

    let sales = sales(&mut rng);
    let sales_path = out_dir.join("dados_vendas.csv");
    write_csv(&sales_path, &sales)?;
    info!("Wrote {} sales records to {}", sales.len(), sales_path.display());

    println!(
        "Wrote {} price records and {} sales records to {}",
        prices.len(),
        sales.len(),
        out_dir.display()
    );
    Ok(())
}

use gaspos_core::SyncRecord;
use serde::Serialize;
use serde_json::{json, Map, Value};

use crate::commands::common::{format_datetime, load_settings, open_database, NodePaths};
use crate::error::CliError;

const STOCK_TABLE: &str = "stock";

#[derive(Debug, Serialize)]
pub struct StockListItem {
    pub id: String,
    pub name: Option<String>,
    pub stock: Option<i64>,
    pub price: Option<f64>,
    pub updated_at: String,
}

pub async fn run_stock_add(
    name: &str,
    stock: i64,
    price: f64,
    paths: &NodePaths,
) -> Result<(), CliError> {
    let name = name.trim();
    if name.is_empty() {
        return Err(CliError::InvalidInput("stock item name cannot be empty".to_string()));
    }
    if stock < 0 || price < 0.0 || !price.is_finite() {
        return Err(CliError::InvalidInput(
            "stock and price must not be negative".to_string(),
        ));
    }

    let settings = load_settings()?;
    let db = open_database(&paths.db).await?;
    let record = db
        .create_record(STOCK_TABLE, &settings.node_id, stock_payload(name, stock, price))
        .await?;

    println!("{}", record.id);
    Ok(())
}

pub async fn run_stock_list(limit: usize, as_json: bool, paths: &NodePaths) -> Result<(), CliError> {
    let db = open_database(&paths.db).await?;
    let items = db
        .list_records(STOCK_TABLE, limit)
        .await?
        .iter()
        .map(stock_to_list_item)
        .collect::<Vec<StockListItem>>();

    if as_json {
        println!("{}", serde_json::to_string_pretty(&items)?);
        return Ok(());
    }
    if items.is_empty() {
        println!("No stock rows recorded.");
        return Ok(());
    }
    for item in &items {
        println!(
            "{}  {:<20} stock {:>5}  price {:>8.2}  {}",
            item.id,
            item.name.as_deref().unwrap_or("-"),
            item.stock.unwrap_or_default(),
            item.price.unwrap_or_default(),
            item.updated_at
        );
    }
    Ok(())
}

pub fn stock_payload(name: &str, stock: i64, price: f64) -> Map<String, Value> {
    let mut payload = Map::new();
    payload.insert("name".to_string(), json!(name));
    payload.insert("stock".to_string(), json!(stock));
    payload.insert("price".to_string(), json!(price));
    payload
}

pub fn stock_to_list_item(record: &SyncRecord) -> StockListItem {
    StockListItem {
        id: record.id.to_string(),
        name: record
            .payload
            .get("name")
            .and_then(Value::as_str)
            .map(str::to_string),
        stock: record.payload.get("stock").and_then(Value::as_i64),
        price: record.payload.get("price").and_then(Value::as_f64),
        updated_at: format_datetime(Some(&record.updated_at)),
    }
}

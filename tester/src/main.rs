use anyhow::{Context, Result, bail};
use clap::Parser;
use reqwest::Client;
use serde_json::{Value, json};

/// End-to-end smoke run against a live server: log in, create a product,
/// place an order for it, mark it paid, list it back.
#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    #[arg(default_value = "http://localhost:3000")]
    base_url: String,

    #[arg(long, default_value = "admin")]
    username: String,

    #[arg(long, default_value = "admin")]
    password: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let client = Client::new();

    let login: Value = client
        .post(format!("{}/auth/login", args.base_url))
        .json(&json!({ "username": args.username, "password": args.password }))
        .send()
        .await?
        .json()
        .await?;

    let Some(token) = login["token"].as_str() else {
        bail!("Login failed: {login}");
    };
    println!("Logged in as {}", args.username);

    let created: Value = client
        .post(format!("{}/products", args.base_url))
        .bearer_auth(token)
        .json(&json!({
            "name": "Smoke Test Empanada",
            "price": 100.0,
            "stock": 5,
            "category": "food",
        }))
        .send()
        .await?
        .json()
        .await?;

    let product_id = created["product"]["id"]
        .as_i64()
        .context("Product creation failed")?;
    println!("Created product {product_id}");

    let order: Value = client
        .post(format!("{}/orders", args.base_url))
        .json(&json!({
            "buyer_name": "Smoke Tester",
            "payment_method": "cash",
            "table": 1,
            "items": [{ "product_id": product_id, "quantity": 2 }],
        }))
        .send()
        .await?
        .json()
        .await?;

    let order_id = order["order"]["id"].as_i64().context("Order failed")?;
    println!(
        "Placed order {order_id}, total {}",
        order["order"]["total"]
    );

    let paid: Value = client
        .patch(format!("{}/orders/{order_id}/status", args.base_url))
        .bearer_auth(token)
        .json(&json!({ "paid": true }))
        .send()
        .await?
        .json()
        .await?;
    println!("Marked paid: {}", paid["order"]["paid"]);

    let listed: Value = client
        .get(format!("{}/orders", args.base_url))
        .bearer_auth(token)
        .send()
        .await?
        .json()
        .await?;

    let count = listed["orders"].as_array().map_or(0, Vec::len);
    println!("Server has {count} order(s)");

    Ok(())
}

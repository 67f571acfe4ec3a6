use std::time::Instant;

use actix_web::{web, HttpResponse, Responder};
use log::{error, info};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::schema::BlockView;
use crate::blockchain::{Blockchain, BlockchainError};

/// Data structure for the blockchain state
pub type BlockchainData = web::Data<Blockchain>;

pub const WAIT_MSG: &str = "create new block, please wait a while.";
pub const EMPTY_PARAMETER_MSG: &str = "error: empty parameter.";
pub const ZERO_AMOUNT_MSG: &str = "error: amount must be positive.";

/// Form for the add block endpoint
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct AddBlockForm {
    /// The data to store in the new block
    #[serde(default)]
    pub data: String,
}

/// Request for the send endpoint
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct SendRequest {
    /// The address spending its outputs
    pub from: String,

    /// The recipient's address
    pub to: String,

    /// The amount to transfer
    pub amount: u64,

    /// The address receiving the block reward, defaults to `from`
    pub miner: Option<String>,
}

/// Response for the balance endpoint
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct BalanceResponse {
    pub address: String,
    pub balance: u64,
}

/// Add a data block
///
/// Mining runs in the background; the response only acknowledges the request
#[utoipa::path(
    post,
    path = "/api/v1/addblock",
    request_body(content = AddBlockForm, content_type = "application/x-www-form-urlencoded"),
    responses(
        (status = 202, description = "Mining started", body = String),
        (status = 400, description = "Empty data")
    )
)]
pub async fn add_block(blockchain: BlockchainData, form: web::Form<AddBlockForm>) -> impl Responder {
    let data = form.into_inner().data;
    if data.is_empty() {
        return HttpResponse::BadRequest().body(EMPTY_PARAMETER_MSG);
    }

    info!("Begin creating new block, data: {}", data);
    let blockchain = blockchain.into_inner();

    // no handle is kept; the outcome is only logged
    tokio::task::spawn_blocking(move || {
        let started = Instant::now();
        match blockchain.append_data(data) {
            Ok(block) => info!(
                "prev hash: {} block data: {} block hash: {} cost time: {:.2}s",
                hex::encode(&block.prev_block_hash),
                block.payload,
                hex::encode(&block.hash),
                started.elapsed().as_secs_f64()
            ),
            Err(err) => error!("Failed to append block: {}", err),
        }
    });

    HttpResponse::Accepted().body(WAIT_MSG)
}

/// Dump the chain as text
///
/// Walks from the tip back to genesis
#[utoipa::path(
    get,
    path = "/api/v1/dumpchain",
    responses(
        (status = 200, description = "Chain dump", body = String),
        (status = 500, description = "Storage error")
    )
)]
pub async fn dump_chain(blockchain: BlockchainData) -> impl Responder {
    match render_dump(&blockchain) {
        Ok(body) => HttpResponse::Ok()
            .content_type("text/plain; charset=utf-8")
            .body(body),
        Err(err) => internal_error("Failed to dump chain", err),
    }
}

/// Renders every block, newest first, with its proof-of-work status
pub fn render_dump(blockchain: &Blockchain) -> Result<String, BlockchainError> {
    let mut out = String::new();

    for block in blockchain.iter()? {
        let block = block?;
        out.push_str(&format!("PrevHash: {}\n", hex::encode(&block.prev_block_hash)));
        out.push_str(&format!("Data: {}\n", block.payload));
        out.push_str(&format!("Hash: {}\n", hex::encode(&block.hash)));
        out.push_str(&format!("PoW: {}\n", blockchain.validate(&block)));
        out.push_str("\n\n");
    }

    Ok(out)
}

/// Get the full blockchain
///
/// Returns every block from the tip back to genesis
#[utoipa::path(
    get,
    path = "/api/v1/chain",
    responses(
        (status = 200, description = "Blockchain retrieved successfully", body = Vec<BlockView>),
        (status = 500, description = "Storage error")
    )
)]
pub async fn get_chain(blockchain: BlockchainData) -> impl Responder {
    let difficulty = blockchain.difficulty();
    let views: Result<Vec<BlockView>, BlockchainError> = blockchain.iter().and_then(|iter| {
        iter.map(|block| {
            block.map(|block| BlockView::new(&block, difficulty, blockchain.validate(&block)))
        })
        .collect()
    });

    match views {
        Ok(views) => HttpResponse::Ok().json(views),
        Err(err) => internal_error("Failed to read chain", err),
    }
}

/// Get the balance of an address
#[utoipa::path(
    get,
    path = "/api/v1/balance/{address}",
    params(
        ("address" = String, Path, description = "Address to query")
    ),
    responses(
        (status = 200, description = "Balance retrieved successfully", body = BalanceResponse),
        (status = 500, description = "Storage error")
    )
)]
pub async fn get_balance(blockchain: BlockchainData, address: web::Path<String>) -> impl Responder {
    let address = address.into_inner();

    match blockchain.get_balance(&address) {
        Ok(balance) => HttpResponse::Ok().json(BalanceResponse { address, balance }),
        Err(err) => internal_error("Failed to compute balance", err),
    }
}

/// Send coins
///
/// Funds are checked up front; the transfer is mined in the background
#[utoipa::path(
    post,
    path = "/api/v1/send",
    request_body = SendRequest,
    responses(
        (status = 202, description = "Transfer accepted"),
        (status = 400, description = "Zero amount or insufficient funds"),
        (status = 500, description = "Storage error")
    )
)]
pub async fn send(blockchain: BlockchainData, request: web::Json<SendRequest>) -> impl Responder {
    let request = request.into_inner();
    if request.amount == 0 {
        return HttpResponse::BadRequest().json(serde_json::json!({ "error": ZERO_AMOUNT_MSG }));
    }

    let available = match blockchain.find_spendable_outputs(&request.from, request.amount) {
        Ok((accumulated, _)) => accumulated,
        Err(err) => return internal_error("Failed to scan outputs", err),
    };
    if available < request.amount {
        return HttpResponse::BadRequest().json(serde_json::json!({
            "error": format!("Insufficient funds: required {}, available {}", request.amount, available),
            "required": request.amount,
            "available": available
        }));
    }

    let blockchain = blockchain.into_inner();
    let miner = request.miner.clone().unwrap_or_else(|| request.from.clone());

    // outputs are selected again under the append lock
    tokio::task::spawn_blocking(move || {
        match blockchain.send(&request.from, &request.to, request.amount, &miner) {
            Ok(block) => info!(
                "Sent {} from {} to {} in block {}",
                request.amount,
                request.from,
                request.to,
                hex::encode(&block.hash)
            ),
            Err(err) => error!("Failed to send {} from {}: {}", request.amount, request.from, err),
        }
    });

    HttpResponse::Accepted().json(serde_json::json!({ "message": WAIT_MSG }))
}

fn internal_error(context: &str, err: BlockchainError) -> HttpResponse {
    error!("{}: {}", context, err);
    HttpResponse::InternalServerError().json(serde_json::json!({
        "error": format!("{}: {}", context, err)
    }))
}

use actix_cors::Cors;
use actix_web::{middleware, web, App, HttpServer};
use anyhow::Context;
use log::info;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use pow_ledger::api;
use pow_ledger::blockchain::ChainHandle;
use pow_ledger::config::Config;

#[derive(OpenApi)]
#[openapi(
    paths(
        api::handlers::add_block,
        api::handlers::dump_chain,
        api::handlers::get_chain,
        api::handlers::get_balance,
        api::handlers::send
    ),
    components(
        schemas(
            api::handlers::AddBlockForm,
            api::handlers::SendRequest,
            api::handlers::BalanceResponse,
            api::schema::BlockView,
            api::schema::TransactionView,
            api::schema::InputView,
            api::schema::OutputView
        )
    ),
    tags(
        (name = "ledger", description = "Proof-of-work ledger API endpoints")
    ),
    info(
        title = "Ledger API",
        version = "0.1.0",
        description = "A single-node proof-of-work ledger",
        license(
            name = "MIT",
            url = "https://opensource.org/licenses/MIT"
        )
    )
)]
struct ApiDoc;

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logger
    env_logger::init_from_env(env_logger::Env::new().default_filter_or("info"));

    let config = Config::from_env()?;
    std::fs::create_dir_all(&config.data_dir).with_context(|| {
        format!("failed to create data directory {}", config.data_dir.display())
    })?;

    // No usable chain without storage: opening failures end the process
    let handle = ChainHandle::from_config(&config);
    let blockchain = handle
        .get()
        .with_context(|| format!("failed to open blockchain at {}", config.data_dir.display()))?;
    let blockchain = web::Data::from(blockchain);

    info!("Starting HTTP server at http://{}:{}", config.host, config.port);

    HttpServer::new(move || {
        // Configure CORS
        let cors = Cors::default()
            .allow_any_origin()
            .allow_any_method()
            .allow_any_header()
            .max_age(3600);

        let openapi = ApiDoc::openapi();

        App::new()
            .wrap(middleware::Logger::default())
            .wrap(cors)
            .app_data(blockchain.clone())
            .configure(api::configure_routes)
            .service(
                SwaggerUi::new("/swagger-ui/{_:.*}")
                    .url("/api-docs/openapi.json", openapi)
            )
    })
    .bind((config.host.as_str(), config.port))?
    .run()
    .await?;

    Ok(())
}

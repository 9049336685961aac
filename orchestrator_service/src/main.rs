use dotenvy::dotenv;
use orchestrator_service::{
    api::http_routes::{routes, AppState},
    config::Config,
    infrastructure::{
        crypto::SeedCipher,
        gateways::json_rpc_ledger_gateway::XrplJsonRpcGateway,
        persistence::{
            operation_repository::PostgresOperationRepository,
            wallet_repository::PostgresWalletRepository,
        },
        secret_store::CachedSecretStore,
        signer_locks::SignerLocks,
    },
    jobs::validation_poller::ValidationPollerJob,
    use_cases::{
        create_wallet::CreateWalletUseCase,
        execute_operation::{ExecuteOperationUseCase, ExecutorConfig},
        fund_wallet::FundWalletUseCase,
        get_operation::GetOperationUseCase,
        get_wallet::GetWalletUseCase,
        submit_intent::SubmitIntentUseCase,
    },
};
use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;
use tracing_subscriber::FmtSubscriber;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

#[derive(OpenApi)]
#[openapi(
    paths(
        orchestrator_service::api::http_routes::submit_mint,
        orchestrator_service::api::http_routes::submit_transfer,
        orchestrator_service::api::http_routes::submit_burn,
        orchestrator_service::api::http_routes::get_operation,
        orchestrator_service::api::http_routes::create_wallet,
        orchestrator_service::api::http_routes::get_wallet,
        orchestrator_service::api::http_routes::fund_wallet,
        orchestrator_service::api::http_routes::health
    ),
    components(schemas(
        orchestrator_service::api::http_routes::MintRequest,
        orchestrator_service::api::http_routes::TransferRequest,
        orchestrator_service::api::http_routes::BurnRequest,
        orchestrator_service::api::http_routes::CreateWalletRequest
    ))
)]
struct ApiDoc;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // 1. Cargar variables de entorno
    dotenv().ok();

    // 2. Cargar configuración tipada (fatal si falta la master key o el seed
    //    del emisor)
    let config = Config::from_env()?;

    // 3. Configurar Logging/Tracing
    let subscriber = FmtSubscriber::builder()
        .with_max_level(config.log_level)
        .finish();
    tracing::subscriber::set_global_default(subscriber).expect("setting default subscriber failed");

    info!("Starting Orchestrator Service...");

    // 4. Configurar Conexión a Base de Datos y aplicar migraciones
    let pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(&config.database_url)
        .await?;

    sqlx::migrate!("./migrations").run(&pool).await?;

    info!("Connected to Database");

    // 5. Instanciar Dependencias (Infraestructura)
    let operation_repo = Arc::new(PostgresOperationRepository::new(pool.clone()));
    let wallet_repo = Arc::new(PostgresWalletRepository::new(pool.clone()));
    let cipher = Arc::new(SeedCipher::new(&config.master_key));
    let secret_store = Arc::new(CachedSecretStore::new(
        wallet_repo.clone(),
        cipher.clone(),
        config.issuer_seed.clone(),
        config.secret_cache_ttl,
    ));
    let ledger_gateway = Arc::new(XrplJsonRpcGateway::new(
        config.network.json_rpc_url().to_string(),
        config.network.faucet_url().map(String::from),
    ));
    let signer_locks = Arc::new(SignerLocks::new());

    info!("Ledger network: {:?}", config.network);

    // 6. Instanciar Casos de Uso
    let executor = Arc::new(ExecuteOperationUseCase::new(
        operation_repo.clone(),
        wallet_repo.clone(),
        secret_store.clone(),
        ledger_gateway.clone(),
        signer_locks.clone(),
        ExecutorConfig::default(),
    ));

    let submit_intent_use_case = SubmitIntentUseCase::new(
        operation_repo.clone(),
        wallet_repo.clone(),
        executor.clone(),
    );
    let get_operation_use_case = GetOperationUseCase::new(operation_repo.clone());
    let create_wallet_use_case =
        CreateWalletUseCase::new(wallet_repo.clone(), ledger_gateway.clone(), cipher.clone());
    let get_wallet_use_case = GetWalletUseCase::new(
        wallet_repo.clone(),
        secret_store.clone(),
        ledger_gateway.clone(),
    );
    let fund_wallet_use_case =
        FundWalletUseCase::new(wallet_repo.clone(), ledger_gateway.clone());

    // 7. Iniciar Background Jobs (poller de validación + barrido del caché de
    //    seeds), con señal de apagado limpio
    let (shutdown_tx, _) = tokio::sync::watch::channel(false);

    {
        let mut shutdown_rx = shutdown_tx.subscribe();
        let poller = ValidationPollerJob::new(operation_repo.clone(), ledger_gateway.clone());

        tokio::spawn(async move {
            // Intervalo de barrido: cada 30 segundos
            let mut interval = tokio::time::interval(Duration::from_secs(30));
            info!("Validation poller started");

            loop {
                tokio::select! {
                    _ = interval.tick() => poller.run().await,
                    _ = shutdown_rx.changed() => {
                        info!("Validation poller stopped");
                        break;
                    }
                }
            }
        });
    }

    {
        let mut shutdown_rx = shutdown_tx.subscribe();
        let store = secret_store.clone();

        tokio::spawn(async move {
            // Barrido del caché de seeds: cada 60 segundos
            let mut interval = tokio::time::interval(Duration::from_secs(60));

            loop {
                tokio::select! {
                    _ = interval.tick() => store.sweep(),
                    _ = shutdown_rx.changed() => break,
                }
            }
        });
    }

    // 8. Configurar Estado de la App Axum
    let app_state = Arc::new(AppState {
        submit_intent_use_case,
        get_operation_use_case,
        create_wallet_use_case,
        get_wallet_use_case,
        fund_wallet_use_case,
    });

    // 9. Configurar Rutas y Servidor
    let app = routes(app_state)
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()));

    let addr = format!("{}:{}", config.host, config.port);

    info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            tokio::signal::ctrl_c().await.ok();
        })
        .await?;

    // 10. Apagado limpio: los jobs salen en su próximo límite de iteración;
    //     los pasos que queden en vuelo los retoma el poller en el próximo boot
    let _ = shutdown_tx.send(true);
    info!("Orchestrator Service stopped");

    Ok(())
}

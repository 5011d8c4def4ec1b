use axum::{
    Router,
    extract::State,
    http::HeaderMap,
    response::IntoResponse,
    routing::{get, post},
};
use certpress::{CertPress, CertificateRequest, FontCatalog, output_file_name};
use std::path::PathBuf;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

#[derive(Clone)]
struct Config {
    api_key: String,
    template_path: PathBuf,
    fonts_dir: PathBuf,
    output_dir: PathBuf,
    verify_base_url: Option<String>,
    host: String,
    port: u16,
}

impl Config {
    fn from_env() -> Result<Self, Box<dyn std::error::Error + Send + Sync>> {
        dotenvy::dotenv().ok();

        let api_key = std::env::var("CERT_API_KEY").map_err(|_| "CERT_API_KEY must be set")?;

        let base_dir = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
        let template_path = base_dir.join(
            std::env::var("TEMPLATE_PATH").unwrap_or_else(|_| "assets/certificate.pdf".to_string()),
        );
        let fonts_dir =
            base_dir.join(std::env::var("FONTS_DIR").unwrap_or_else(|_| "assets/fonts".to_string()));
        let output_dir =
            base_dir.join(std::env::var("OUTPUT_DIR").unwrap_or_else(|_| "output".to_string()));
        let verify_base_url = std::env::var("VERIFY_BASE_URL").ok();

        let host = std::env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string());
        let port: u16 = std::env::var("PORT")
            .unwrap_or_else(|_| "8000".to_string())
            .parse()
            .unwrap_or(8000);

        Ok(Self {
            api_key,
            template_path,
            fonts_dir,
            output_dir,
            verify_base_url,
            host,
            port,
        })
    }
}

struct AppState {
    config: Config,
    press: CertPress,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "certpress=info,tower_http=info".into()),
        )
        .init();

    let config = Config::from_env()?;
    std::fs::create_dir_all(&config.output_dir)?;

    let fonts = Arc::new(FontCatalog::load(&config.fonts_dir)?);
    let mut press = CertPress::new(fonts, &config.template_path);
    if let Some(base_url) = &config.verify_base_url {
        press = press.with_verify_base_url(base_url.clone());
    }

    let state = Arc::new(AppState { config, press });
    let addr = format!("{}:{}", state.config.host, state.config.port);

    let app = Router::new()
        .route("/health", get(health))
        .route("/generate-certificate", post(generate_certificate))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state);

    tracing::info!("certpress listening on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

async fn health() -> impl IntoResponse {
    axum::Json(serde_json::json!({ "status": "ok" }))
}

async fn generate_certificate(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    axum::Json(request): axum::Json<CertificateRequest>,
) -> impl IntoResponse {
    let presented = headers.get("x-api-key").and_then(|v| v.to_str().ok());
    if presented != Some(state.config.api_key.as_str()) {
        return (
            axum::http::StatusCode::UNAUTHORIZED,
            axum::Json(serde_json::json!({ "detail": "Invalid API key" })),
        )
            .into_response();
    }

    let file_name = output_file_name(&request.certificate_id);
    let output_path = state.config.output_dir.join(&file_name);

    let press = state.press.clone();
    let generate_path = output_path.clone();
    let result = tokio::task::spawn_blocking(move || {
        let generated = press.generate(&request, &generate_path)?;
        let content = std::fs::read(&generated.path)?;
        // The file is a transient spool; the response body is the product.
        std::fs::remove_file(&generated.path).ok();
        Ok::<_, certpress::CertPressError>(content)
    })
    .await;

    match result {
        Ok(Ok(content)) => axum::response::Response::builder()
            .header("Content-Type", "application/pdf")
            .header(
                "Content-Disposition",
                format!("attachment; filename=\"{}\"", file_name),
            )
            .body(axum::body::Body::from(content))
            .unwrap()
            .into_response(),
        Ok(Err(err)) => (
            axum::http::StatusCode::INTERNAL_SERVER_ERROR,
            axum::Json(serde_json::json!({ "detail": err.to_string() })),
        )
            .into_response(),
        Err(err) => {
            tracing::error!(error = %err, "generation task panicked");
            (
                axum::http::StatusCode::INTERNAL_SERVER_ERROR,
                axum::Json(serde_json::json!({ "detail": "certificate generation failed" })),
            )
                .into_response()
        }
    }
}

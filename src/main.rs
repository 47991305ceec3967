mod api;
mod auth;
mod models;
mod notify;
mod store;

use actix_cors::Cors;
use actix_web::{middleware, web, App, HttpServer};
use chrono::Utc;
use std::env;
use std::sync::Arc;

use api::AppState;
use auth::AuthService;
use models::Account;
use notify::NotificationDispatcher;
use store::Store;

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    // Initialize logger
    env_logger::init_from_env(env_logger::Env::default().default_filter_or("info"));

    // Load environment variables
    dotenvy::dotenv().ok();

    // Get configuration from environment
    let port: u16 = env::var("PORT")
        .unwrap_or_else(|_| "8080".to_string())
        .parse()
        .expect("PORT must be a number");

    let db_path = env::var("DATABASE_PATH").unwrap_or_else(|_| "fokal.db".to_string());

    let jwt_secret = env::var("JWT_SECRET").unwrap_or_else(|_| {
        log::warn!("JWT_SECRET not set, using default (not secure for production!)");
        "default_jwt_secret_change_me".to_string()
    });

    // Initialize store
    let store = Arc::new(Store::new(&db_path).expect("Failed to initialize database"));

    // Initialize auth service
    let auth_service = Arc::new(AuthService::new(jwt_secret));

    // Initialize notification dispatcher
    let dispatcher = Arc::new(NotificationDispatcher::new(store.clone()));

    // Auto-create an admin account from environment variables if no accounts exist
    let admin_username = env::var("ADMIN_USERNAME").ok();
    let admin_password = env::var("ADMIN_PASSWORD").ok();

    if let (Some(username), Some(password)) = (admin_username, admin_password) {
        let account_count = store.count_accounts().expect("Failed to count accounts");
        if account_count == 0 {
            log::info!("Creating admin account from environment: {}", username);
            let password_hash = auth_service
                .hash_password(&password)
                .expect("Failed to hash password");

            let mut admin = Account {
                id: String::new(),
                username: username.clone(),
                email: format!("{}@fokal.app", username),
                password_hash,
                display_name: username,
                bio: String::new(),
                avatar_url: String::new(),
                is_admin: true,
                created_at: Utc::now(),
                updated_at: Utc::now(),
            };

            store
                .create_account(&mut admin)
                .expect("Failed to create admin account");
            log::info!("Admin account created successfully");
        }
    }

    log::info!("Database: {}", db_path);
    log::info!("Starting fokal-core server on port {}", port);

    HttpServer::new(move || {
        let cors = Cors::default()
            .allow_any_origin()
            .allow_any_method()
            .allow_any_header()
            .max_age(3600);

        App::new()
            .wrap(middleware::Logger::default())
            .wrap(cors)
            // Register AuthService individually for the AuthUser extractor
            .app_data(web::Data::from(auth_service.clone()))
            .app_data(web::Data::new(AppState {
                store: store.clone(),
                auth_service: auth_service.clone(),
                dispatcher: dispatcher.clone(),
            }))
            .configure(api::configure_routes)
    })
    .bind(("0.0.0.0", port))?
    .run()
    .await
}

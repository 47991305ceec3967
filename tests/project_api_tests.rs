use actix_web::{test, web, App};
use serde_json::json;
use std::sync::Arc;

use fokal_core::api::{self, AppState};
use fokal_core::auth::AuthService;
use fokal_core::models::{Account, Photo};
use fokal_core::notify::NotificationDispatcher;
use fokal_core::store::Store;

/// Helper to create AppState with all required components
fn create_app_state(store: Arc<Store>, auth_service: Arc<AuthService>) -> AppState {
    AppState {
        store: store.clone(),
        auth_service: auth_service.clone(),
        dispatcher: Arc::new(NotificationDispatcher::new(store)),
    }
}

/// Helper to create a test account and return it with an auth token
async fn create_test_account_with_token(
    store: &Arc<Store>,
    auth_service: &Arc<AuthService>,
    username: &str,
) -> (Account, String) {
    let password_hash = auth_service.hash_password("testpass123").unwrap();

    let mut account = Account {
        id: String::new(),
        username: username.to_string(),
        email: format!("{}@test.com", username),
        password_hash,
        display_name: username.to_string(),
        bio: String::new(),
        avatar_url: String::new(),
        is_admin: false,
        created_at: chrono::Utc::now(),
        updated_at: chrono::Utc::now(),
    };

    store.create_account(&mut account).unwrap();
    let token = auth_service
        .generate_token(&account.id, account.is_admin)
        .unwrap();
    (account, token)
}

/// Helper to create a photo owned by the given account
async fn create_test_photo(store: &Arc<Store>, owner_id: &str, title: &str) -> String {
    let mut photo = Photo {
        id: String::new(),
        owner_id: owner_id.to_string(),
        project_id: None,
        title: title.to_string(),
        url: format!("https://photos.test/{}.jpg", title),
        like_count: 0,
        created_at: chrono::Utc::now(),
    };

    store.create_photo(&mut photo).unwrap();
    photo.id
}

// ==================== Project CRUD Tests ====================

#[actix_web::test]
async fn test_create_and_fetch_project() {
    let store = Arc::new(Store::new(":memory:").unwrap());
    let auth_service = Arc::new(AuthService::new("test_secret".to_string()));
    let (_bob, token) = create_test_account_with_token(&store, &auth_service, "bob").await;

    let app = test::init_service(
        App::new()
            .app_data(web::Data::from(auth_service.clone()))
            .app_data(web::Data::new(create_app_state(store.clone(), auth_service.clone())))
            .configure(api::configure_routes)
    ).await;

    let req = test::TestRequest::post()
        .uri("/api/projects")
        .insert_header(("Authorization", format!("Bearer {}", token)))
        .set_json(json!({ "name": "Jensen Wedding", "status": "delivered" }))
        .to_request();

    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 201);

    let body: serde_json::Value = test::read_body_json(resp).await;
    assert_eq!(body["success"], true);
    assert_eq!(body["data"]["name"], "Jensen Wedding");
    assert_eq!(body["data"]["status"], "delivered");
    let project_id = body["data"]["id"].as_str().unwrap().to_string();

    let req = test::TestRequest::get()
        .uri(&format!("/api/projects/{}", project_id))
        .insert_header(("Authorization", format!("Bearer {}", token)))
        .to_request();

    let resp: serde_json::Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(resp["data"]["name"], "Jensen Wedding");
}

#[actix_web::test]
async fn test_create_project_defaults_to_active() {
    let store = Arc::new(Store::new(":memory:").unwrap());
    let auth_service = Arc::new(AuthService::new("test_secret".to_string()));
    let (_bob, token) = create_test_account_with_token(&store, &auth_service, "bob").await;

    let app = test::init_service(
        App::new()
            .app_data(web::Data::from(auth_service.clone()))
            .app_data(web::Data::new(create_app_state(store.clone(), auth_service.clone())))
            .configure(api::configure_routes)
    ).await;

    let req = test::TestRequest::post()
        .uri("/api/projects")
        .insert_header(("Authorization", format!("Bearer {}", token)))
        .set_json(json!({ "name": "New Shoot" }))
        .to_request();

    let resp: serde_json::Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(resp["data"]["status"], "active");
}

#[actix_web::test]
async fn test_list_projects_scoped_to_owner() {
    let store = Arc::new(Store::new(":memory:").unwrap());
    let auth_service = Arc::new(AuthService::new("test_secret".to_string()));
    let (_alice, alice_token) = create_test_account_with_token(&store, &auth_service, "alice").await;
    let (_bob, bob_token) = create_test_account_with_token(&store, &auth_service, "bob").await;

    let app = test::init_service(
        App::new()
            .app_data(web::Data::from(auth_service.clone()))
            .app_data(web::Data::new(create_app_state(store.clone(), auth_service.clone())))
            .configure(api::configure_routes)
    ).await;

    for name in ["One", "Two"] {
        let req = test::TestRequest::post()
            .uri("/api/projects")
            .insert_header(("Authorization", format!("Bearer {}", bob_token)))
            .set_json(json!({ "name": name }))
            .to_request();
        test::call_service(&app, req).await;
    }

    let req = test::TestRequest::post()
        .uri("/api/projects")
        .insert_header(("Authorization", format!("Bearer {}", alice_token)))
        .set_json(json!({ "name": "Mine" }))
        .to_request();
    test::call_service(&app, req).await;

    let req = test::TestRequest::get()
        .uri("/api/projects")
        .insert_header(("Authorization", format!("Bearer {}", alice_token)))
        .to_request();

    let resp: serde_json::Value = test::call_and_read_body_json(&app, req).await;
    let projects = resp["data"].as_array().unwrap();
    assert_eq!(projects.len(), 1);
    assert_eq!(projects[0]["name"], "Mine");
}

#[actix_web::test]
async fn test_project_hidden_from_non_owner() {
    let store = Arc::new(Store::new(":memory:").unwrap());
    let auth_service = Arc::new(AuthService::new("test_secret".to_string()));
    let (_alice, alice_token) = create_test_account_with_token(&store, &auth_service, "alice").await;
    let (_bob, bob_token) = create_test_account_with_token(&store, &auth_service, "bob").await;

    let app = test::init_service(
        App::new()
            .app_data(web::Data::from(auth_service.clone()))
            .app_data(web::Data::new(create_app_state(store.clone(), auth_service.clone())))
            .configure(api::configure_routes)
    ).await;

    let req = test::TestRequest::post()
        .uri("/api/projects")
        .insert_header(("Authorization", format!("Bearer {}", bob_token)))
        .set_json(json!({ "name": "Private Gallery" }))
        .to_request();
    let resp: serde_json::Value = test::call_and_read_body_json(&app, req).await;
    let project_id = resp["data"]["id"].as_str().unwrap().to_string();

    // Alice gets 404, not 403: the project's existence is not disclosed
    let req = test::TestRequest::get()
        .uri(&format!("/api/projects/{}", project_id))
        .insert_header(("Authorization", format!("Bearer {}", alice_token)))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 404);

    let req = test::TestRequest::delete()
        .uri(&format!("/api/projects/{}", project_id))
        .insert_header(("Authorization", format!("Bearer {}", alice_token)))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 404);

    // Bob still has it
    let req = test::TestRequest::get()
        .uri(&format!("/api/projects/{}", project_id))
        .insert_header(("Authorization", format!("Bearer {}", bob_token)))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 200);
}

#[actix_web::test]
async fn test_projects_require_auth() {
    let store = Arc::new(Store::new(":memory:").unwrap());
    let auth_service = Arc::new(AuthService::new("test_secret".to_string()));

    let app = test::init_service(
        App::new()
            .app_data(web::Data::from(auth_service.clone()))
            .app_data(web::Data::new(create_app_state(store.clone(), auth_service.clone())))
            .configure(api::configure_routes)
    ).await;

    let req = test::TestRequest::post()
        .uri("/api/projects")
        .set_json(json!({ "name": "Anonymous" }))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 401);

    let req = test::TestRequest::get().uri("/api/projects").to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 401);
}

// ==================== Attach / Detach Tests ====================

#[actix_web::test]
async fn test_attach_and_detach_photo() {
    let store = Arc::new(Store::new(":memory:").unwrap());
    let auth_service = Arc::new(AuthService::new("test_secret".to_string()));
    let (bob, token) = create_test_account_with_token(&store, &auth_service, "bob").await;
    let photo_id = create_test_photo(&store, &bob.id, "ceremony").await;

    let app = test::init_service(
        App::new()
            .app_data(web::Data::from(auth_service.clone()))
            .app_data(web::Data::new(create_app_state(store.clone(), auth_service.clone())))
            .configure(api::configure_routes)
    ).await;

    let req = test::TestRequest::post()
        .uri("/api/projects")
        .insert_header(("Authorization", format!("Bearer {}", token)))
        .set_json(json!({ "name": "Wedding" }))
        .to_request();
    let resp: serde_json::Value = test::call_and_read_body_json(&app, req).await;
    let project_id = resp["data"]["id"].as_str().unwrap().to_string();

    let req = test::TestRequest::post()
        .uri(&format!("/api/projects/{}/photos/{}", project_id, photo_id))
        .insert_header(("Authorization", format!("Bearer {}", token)))
        .to_request();
    let resp: serde_json::Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(resp["success"], true);
    assert_eq!(resp["data"]["project_id"], project_id.as_str());

    let req = test::TestRequest::delete()
        .uri(&format!("/api/projects/{}/photos/{}", project_id, photo_id))
        .insert_header(("Authorization", format!("Bearer {}", token)))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 204);

    let req = test::TestRequest::get()
        .uri(&format!("/api/photos/{}", photo_id))
        .to_request();
    let resp: serde_json::Value = test::call_and_read_body_json(&app, req).await;
    assert!(resp["data"]["project_id"].is_null());
}

#[actix_web::test]
async fn test_attach_rejects_foreign_photo() {
    let store = Arc::new(Store::new(":memory:").unwrap());
    let auth_service = Arc::new(AuthService::new("test_secret".to_string()));
    let (alice, _alice_token) = create_test_account_with_token(&store, &auth_service, "alice").await;
    let (_bob, bob_token) = create_test_account_with_token(&store, &auth_service, "bob").await;
    let alices_photo = create_test_photo(&store, &alice.id, "hers").await;

    let app = test::init_service(
        App::new()
            .app_data(web::Data::from(auth_service.clone()))
            .app_data(web::Data::new(create_app_state(store.clone(), auth_service.clone())))
            .configure(api::configure_routes)
    ).await;

    let req = test::TestRequest::post()
        .uri("/api/projects")
        .insert_header(("Authorization", format!("Bearer {}", bob_token)))
        .set_json(json!({ "name": "Wedding" }))
        .to_request();
    let resp: serde_json::Value = test::call_and_read_body_json(&app, req).await;
    let project_id = resp["data"]["id"].as_str().unwrap().to_string();

    // Bob cannot attach Alice's photo to his own project
    let req = test::TestRequest::post()
        .uri(&format!("/api/projects/{}/photos/{}", project_id, alices_photo))
        .insert_header(("Authorization", format!("Bearer {}", bob_token)))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 404);

    let photo = store.get_photo(&alices_photo).unwrap();
    assert!(photo.project_id.is_none());
}

#[actix_web::test]
async fn test_detach_photo_not_in_project() {
    let store = Arc::new(Store::new(":memory:").unwrap());
    let auth_service = Arc::new(AuthService::new("test_secret".to_string()));
    let (bob, token) = create_test_account_with_token(&store, &auth_service, "bob").await;
    let photo_id = create_test_photo(&store, &bob.id, "loose").await;

    let app = test::init_service(
        App::new()
            .app_data(web::Data::from(auth_service.clone()))
            .app_data(web::Data::new(create_app_state(store.clone(), auth_service.clone())))
            .configure(api::configure_routes)
    ).await;

    let req = test::TestRequest::post()
        .uri("/api/projects")
        .insert_header(("Authorization", format!("Bearer {}", token)))
        .set_json(json!({ "name": "Wedding" }))
        .to_request();
    let resp: serde_json::Value = test::call_and_read_body_json(&app, req).await;
    let project_id = resp["data"]["id"].as_str().unwrap().to_string();

    let req = test::TestRequest::delete()
        .uri(&format!("/api/projects/{}/photos/{}", project_id, photo_id))
        .insert_header(("Authorization", format!("Bearer {}", token)))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 404);
}

#[actix_web::test]
async fn test_delete_project_detaches_photos() {
    let store = Arc::new(Store::new(":memory:").unwrap());
    let auth_service = Arc::new(AuthService::new("test_secret".to_string()));
    let (bob, token) = create_test_account_with_token(&store, &auth_service, "bob").await;
    let photo_id = create_test_photo(&store, &bob.id, "ceremony").await;

    let app = test::init_service(
        App::new()
            .app_data(web::Data::from(auth_service.clone()))
            .app_data(web::Data::new(create_app_state(store.clone(), auth_service.clone())))
            .configure(api::configure_routes)
    ).await;

    let req = test::TestRequest::post()
        .uri("/api/projects")
        .insert_header(("Authorization", format!("Bearer {}", token)))
        .set_json(json!({ "name": "Wedding" }))
        .to_request();
    let resp: serde_json::Value = test::call_and_read_body_json(&app, req).await;
    let project_id = resp["data"]["id"].as_str().unwrap().to_string();

    let req = test::TestRequest::post()
        .uri(&format!("/api/projects/{}/photos/{}", project_id, photo_id))
        .insert_header(("Authorization", format!("Bearer {}", token)))
        .to_request();
    test::call_service(&app, req).await;

    let req = test::TestRequest::delete()
        .uri(&format!("/api/projects/{}", project_id))
        .insert_header(("Authorization", format!("Bearer {}", token)))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 204);

    // The photo survives, detached; the share link dies with the project
    let photo = store.get_photo(&photo_id).unwrap();
    assert!(photo.project_id.is_none());

    let req = test::TestRequest::get()
        .uri(&format!("/api/share/{}", project_id))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 404);
}

//! The single `actix-web` front door described in `SPEC_FULL.md` §4.J:
//! authenticate, parse the action batch, dispatch it through one shared
//! [`ActionContext`] so later actions can see earlier ones' in-flight
//! objects, and write the merged transaction. Grounded in the reference
//! codebase's `actix_web::App`/`HttpServer` wiring (`server/mod.rs`), swapped
//! from a single GraphQL resolver endpoint to the action-batch endpoint this
//! pipeline exposes.

use crate::action::registry;
use crate::action::ActionContext;
use crate::auth::{AuthRequest, AuthService};
use crate::config::Config;
use crate::datastore::{http::HttpDatastore, Datastore, WriteRequest};
use crate::Error;
use actix_web::middleware::Logger;
use actix_web::web::{Data, Json};
use actix_web::{web, App, HttpRequest, HttpResponse, HttpServer};
use serde::Deserialize;
use serde_json::{json, Value as JsonValue};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

/// One element of the action batch posted to `POST /`.
#[derive(Deserialize)]
pub struct ActionRequestItem {
    pub action: String,
    pub data: Vec<JsonValue>,
}

struct AppData {
    config: Config,
    auth: Arc<dyn AuthService>,
}

fn auth_request(req: &HttpRequest) -> AuthRequest {
    let headers = req
        .headers()
        .iter()
        .filter_map(|(name, value)| value.to_str().ok().map(|v| (name.as_str().to_string(), v.to_string())))
        .collect::<HashMap<_, _>>();
    let cookies = req
        .cookies()
        .map(|jar| jar.iter().map(|c| (c.name().to_string(), c.value().to_string())).collect())
        .unwrap_or_default();
    AuthRequest { headers, cookies }
}

async fn handle_actions(data: Data<AppData>, req: HttpRequest, body: Json<Vec<ActionRequestItem>>) -> Result<HttpResponse, Error> {
    let (user_id, refreshed_token) = data.auth.authenticate(&auth_request(&req)).await?;
    log::debug!("Authenticated request for user {}", user_id);

    let datastore = HttpDatastore::new(data.config.datastore_url.clone());
    let mut ctx = ActionContext::new(&datastore, user_id);

    let mut events = vec![];
    let mut information: BTreeMap<String, Vec<String>> = BTreeMap::new();
    for item in body.into_inner() {
        log::debug!("Dispatching action '{}' with {} payload item(s)", item.action, item.data.len());
        let result = registry::dispatch(&item.action, &item.data, &mut ctx).await?;
        events.extend(result.events);
        for (fqid, lines) in result.information {
            information.entry(fqid).or_default().extend(lines);
        }
    }

    let locked_fields = datastore.locked_fields();
    datastore
        .write(WriteRequest { events, information, user_id, locked_fields })
        .await?;

    let mut response = HttpResponse::Ok();
    if let Some(token) = refreshed_token {
        response.insert_header(("Authentication", token));
    }
    Ok(response.json(json!({ "message": "Action handled successfully" })))
}

pub fn build_auth_service(config: &Config) -> Arc<dyn AuthService> {
    Arc::new(crate::auth::HttpAuthService::new(config.auth_url.clone()))
}

pub async fn run(config: Config, auth: Arc<dyn AuthService>) -> std::io::Result<()> {
    let bind_addr = config.bind_addr();
    log::info!("Starting server on http://{}", bind_addr);
    let app_data = Data::new(AppData { config, auth });

    HttpServer::new(move || {
        App::new()
            .app_data(app_data.clone())
            .wrap(Logger::default())
            .service(web::resource("/").route(web::post().to(handle_actions)))
    })
    .bind(bind_addr)?
    .run()
    .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::StaticAuthService;

    #[test]
    fn action_request_item_parses_name_and_data() {
        let items: Vec<ActionRequestItem> =
            serde_json::from_value(json!([{"action": "topic.create", "data": [{"meeting_id": 1, "title": "hi"}]}])).unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].action, "topic.create");
        assert_eq!(items[0].data.len(), 1);
    }

    #[test]
    fn build_auth_service_wraps_the_configured_url() {
        let config = Config { bind_address: "x".into(), bind_port: "1".into(), datastore_url: "http://ds".into(), auth_url: "http://auth".into() };
        let _service = build_auth_service(&config);
        let _fake: Arc<dyn AuthService> = Arc::new(StaticAuthService { user_id: 1 });
    }
}

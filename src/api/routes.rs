use std::collections::HashMap;
use std::convert::Infallible;
use std::sync::Arc;
use warp::http::StatusCode;
use warp::Filter;

use super::websocket;
use crate::classroom::ClassroomServer;
use crate::identity::Credentials;

/// Every classroom route under `/classroom`
pub fn routes(
    server: Arc<ClassroomServer>,
) -> impl Filter<Extract = impl warp::Reply, Error = warp::Rejection> + Clone {
    classroom_websocket_route(server.clone())
        .or(classroom_health_check())
        .or(classroom_config_endpoint(server.clone()))
        .or(classroom_rooms_endpoint(server))
}

/// `GET /classroom` websocket upgrade.
///
/// The token comes from the `token` query param or an `Authorization: Bearer`
/// header; `adminId`/`studentId` are honored in development mode only.
pub fn classroom_websocket_route(
    server: Arc<ClassroomServer>,
) -> impl Filter<Extract = impl warp::Reply, Error = warp::Rejection> + Clone {
    warp::path("classroom")
        .and(warp::path::end())
        .and(warp::ws())
        .and(warp::query::<HashMap<String, String>>())
        .and(warp::header::optional::<String>("authorization"))
        .and(with_server(server))
        .map(
            |ws: warp::ws::Ws,
             query: HashMap<String, String>,
             authorization: Option<String>,
             server: Arc<ClassroomServer>| {
                let credentials = credentials_from(query, authorization);
                ws.on_upgrade(move |websocket| {
                    websocket::handle_classroom_websocket(websocket, server, credentials)
                })
            },
        )
}

pub fn classroom_health_check(
) -> impl Filter<Extract = impl warp::Reply, Error = warp::Rejection> + Clone {
    warp::path("classroom")
        .and(warp::path("health"))
        .and(warp::path::end())
        .and(warp::get())
        .map(|| {
            warp::reply::json(&serde_json::json!({
                "status": "healthy",
                "service": "Classroom Signaling Server",
                "version": env!("CARGO_PKG_VERSION")
            }))
        })
}

/// ICE servers for clients, with freshly minted TURN credentials
pub fn classroom_config_endpoint(
    server: Arc<ClassroomServer>,
) -> impl Filter<Extract = impl warp::Reply, Error = warp::Rejection> + Clone {
    warp::path("classroom")
        .and(warp::path("config"))
        .and(warp::path::end())
        .and(warp::get())
        .and(with_server(server))
        .map(|server: Arc<ClassroomServer>| match server.ice_servers() {
            Ok(response) => warp::reply::with_status(warp::reply::json(&response), StatusCode::OK),
            Err(e) => {
                tracing::error!(error = %e, "Failed to build ICE server list");
                warp::reply::with_status(
                    warp::reply::json(&serde_json::json!({ "error": e.to_string() })),
                    StatusCode::INTERNAL_SERVER_ERROR,
                )
            }
        })
}

/// Snapshot of active rooms, oldest first
pub fn classroom_rooms_endpoint(
    server: Arc<ClassroomServer>,
) -> impl Filter<Extract = impl warp::Reply, Error = warp::Rejection> + Clone {
    warp::path("classroom")
        .and(warp::path("rooms"))
        .and(warp::path::end())
        .and(warp::get())
        .and(with_server(server))
        .and_then(|server: Arc<ClassroomServer>| async move {
            let rooms = server.registry().list_rooms().await;
            Ok::<_, Infallible>(warp::reply::json(&rooms))
        })
}

fn credentials_from(mut query: HashMap<String, String>, authorization: Option<String>) -> Credentials {
    let bearer = authorization.and_then(|value| {
        value
            .strip_prefix("Bearer ")
            .map(|token| token.trim().to_string())
    });

    Credentials {
        token: query.remove("token").filter(|t| !t.is_empty()).or(bearer),
        admin_id: query.remove("adminId"),
        student_id: query.remove("studentId"),
    }
}

fn with_server(
    server: Arc<ClassroomServer>,
) -> impl Filter<Extract = (Arc<ClassroomServer>,), Error = Infallible> + Clone {
    warp::any().map(move || server.clone())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classroom::test_support::directory;
    use crate::ice::IceConfig;

    fn server() -> Arc<ClassroomServer> {
        Arc::new(ClassroomServer::new(
            Arc::new(directory()),
            None,
            true,
            IceConfig::default(),
        ))
    }

    #[test]
    fn test_credentials_prefer_query_token() {
        let query = HashMap::from([("token".to_string(), "q".to_string())]);
        let creds = credentials_from(query, Some("Bearer h".into()));
        assert_eq!(creds.token.as_deref(), Some("q"));

        let creds = credentials_from(HashMap::new(), Some("Bearer h".into()));
        assert_eq!(creds.token.as_deref(), Some("h"));

        let creds = credentials_from(HashMap::new(), Some("Basic xyz".into()));
        assert!(creds.token.is_none());
    }

    #[tokio::test]
    async fn test_health() {
        let response = warp::test::request()
            .method("GET")
            .path("/classroom/health")
            .reply(&routes(server()))
            .await;

        assert_eq!(response.status(), 200);
        let body: serde_json::Value = serde_json::from_slice(response.body()).unwrap();
        assert_eq!(body["status"], "healthy");
    }

    #[tokio::test]
    async fn test_config_lists_stun() {
        let response = warp::test::request()
            .path("/classroom/config")
            .reply(&routes(server()))
            .await;

        assert_eq!(response.status(), 200);
        let body: serde_json::Value = serde_json::from_slice(response.body()).unwrap();
        assert_eq!(
            body["iceServers"][0]["urls"][0],
            crate::ice::DEFAULT_STUN_URL
        );
    }

    #[tokio::test]
    async fn test_rooms_listing() {
        let server = server();
        let (handler, _rx) = server
            .connect(&Credentials {
                admin_id: Some(crate::classroom::test_support::ADMIN_ID.into()),
                ..Credentials::default()
            })
            .await;
        handler
            .handle_text(r#"{"event":"create-room","data":{"roomId":"r1","courseId":"c1"}}"#)
            .await;

        let response = warp::test::request()
            .path("/classroom/rooms")
            .reply(&routes(server))
            .await;

        let body: serde_json::Value = serde_json::from_slice(response.body()).unwrap();
        assert_eq!(body[0]["roomId"], "r1");
        assert_eq!(body[0]["courseId"], "c1");
        assert_eq!(body[0]["studentCount"], 0);
    }

    #[tokio::test]
    async fn test_websocket_handshake() {
        let mut client = warp::test::ws()
            .path("/classroom?studentId=guest-1")
            .handshake(routes(server()))
            .await
            .expect("handshake");

        let frame = client.recv().await.expect("connected frame");
        let value: serde_json::Value = serde_json::from_str(frame.to_str().unwrap()).unwrap();
        assert_eq!(value["event"], "connected");
        assert_eq!(value["data"]["principal"]["id"], "guest-1");
        assert_eq!(value["data"]["principal"]["role"], "anonymous");
    }
}

use std::convert::Infallible;
use std::future::IntoFuture;
use std::sync::Arc;

use async_stream::stream;
use axum::body::{Body, Bytes};
use axum::extract::State;
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};

use dualsight_core::app_context::AppContext;
use dualsight_core::pipeline::register_face_use_case::RegisterError;
use dualsight_core::pipeline::status::{FaceStatus, ObjectCounts};
use dualsight_core::stream::jpeg::multipart_content_type;
use dualsight_core::stream::mjpeg_stream::MjpegStream;

type AppState = State<Arc<AppContext>>;

pub fn router(context: Arc<AppContext>) -> Router {
    Router::new()
        .route("/video_feed_face", get(video_feed_face))
        .route("/video_feed_object", get(video_feed_object))
        .route("/face_status", get(face_status))
        .route("/object_status", get(object_status))
        .route("/register_face", post(register_face))
        .route("/delete_face", post(delete_face))
        .route("/faces/count", get(face_count))
        .with_state(context)
}

/// Serves until ctrl-c. Open MJPEG connections are not waited for.
pub async fn serve(context: Arc<AppContext>, bind: &str, port: u16) -> std::io::Result<()> {
    let listener = tokio::net::TcpListener::bind((bind, port)).await?;
    log::info!("Listening on http://{}", listener.local_addr()?);

    let server = axum::serve(listener, router(context)).into_future();
    tokio::select! {
        result = server => result,
        _ = tokio::signal::ctrl_c() => {
            log::info!("Shutting down");
            Ok(())
        }
    }
}

async fn video_feed_face(State(ctx): AppState) -> Response {
    mjpeg_response(ctx.face_stream().clone())
}

async fn video_feed_object(State(ctx): AppState) -> Response {
    mjpeg_response(ctx.object_stream().clone())
}

/// Streams parts until the client disconnects. Pulls run on the blocking
/// pool because each one captures and may run inference.
fn mjpeg_response(feed: MjpegStream) -> Response {
    log::debug!("{} stream client connected", feed.name());
    let parts = stream! {
        loop {
            let puller = feed.clone();
            match tokio::task::spawn_blocking(move || puller.next_part()).await {
                Ok(Some(part)) => yield Ok::<_, Infallible>(Bytes::from(part)),
                Ok(None) => tokio::time::sleep(feed.backoff()).await,
                Err(e) => {
                    log::error!("{} stream worker failed: {e}", feed.name());
                    break;
                }
            }
        }
    };

    (
        [
            (header::CONTENT_TYPE, multipart_content_type()),
            (header::CACHE_CONTROL, "no-cache".to_string()),
        ],
        Body::from_stream(parts),
    )
        .into_response()
}

async fn face_status(State(ctx): AppState) -> Json<FaceStatus> {
    Json(ctx.current_face_status())
}

#[derive(Serialize)]
struct ObjectStatus {
    objects: ObjectCounts,
}

async fn object_status(State(ctx): AppState) -> Json<ObjectStatus> {
    Json(ObjectStatus {
        objects: ctx.current_object_counts(),
    })
}

#[derive(Deserialize)]
struct RegisterRequest {
    #[serde(default)]
    name: String,
    #[serde(default)]
    roll_no: String,
}

#[derive(Serialize, Debug, PartialEq)]
struct ActionResponse {
    success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    message: Option<String>,
}

impl ActionResponse {
    fn ok() -> Self {
        Self {
            success: true,
            message: None,
        }
    }

    fn failed(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: Some(message.into()),
        }
    }
}

async fn register_face(
    State(ctx): AppState,
    Json(request): Json<RegisterRequest>,
) -> (StatusCode, Json<ActionResponse>) {
    let outcome =
        tokio::task::spawn_blocking(move || ctx.register_face(&request.name, &request.roll_no))
            .await;
    match outcome {
        Ok(Ok(record)) => {
            log::info!("Registered {} ({})", record.name, record.roll_no);
            (StatusCode::OK, Json(ActionResponse::ok()))
        }
        Ok(Err(e)) => {
            log::info!("Registration rejected: {e}");
            let status = match &e {
                RegisterError::Capture(_) | RegisterError::Store(_) => {
                    StatusCode::INTERNAL_SERVER_ERROR
                }
                _ => StatusCode::OK,
            };
            (status, Json(ActionResponse::failed(e.to_string())))
        }
        Err(e) => {
            log::error!("Registration task failed: {e}");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ActionResponse::failed("internal error")),
            )
        }
    }
}

#[derive(Deserialize)]
struct DeleteRequest {
    #[serde(default)]
    roll_no: String,
}

async fn delete_face(
    State(ctx): AppState,
    Json(request): Json<DeleteRequest>,
) -> (StatusCode, Json<ActionResponse>) {
    let roll_no = request.roll_no.trim().to_string();
    let outcome = tokio::task::spawn_blocking(move || ctx.delete_face(&roll_no)).await;
    match outcome {
        Ok(Ok(true)) => (StatusCode::OK, Json(ActionResponse::ok())),
        Ok(Ok(false)) => (StatusCode::OK, Json(ActionResponse::failed("no such roll number"))),
        Ok(Err(e)) => {
            log::warn!("Delete failed: {e}");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ActionResponse::failed(e.to_string())),
            )
        }
        Err(e) => {
            log::error!("Delete task failed: {e}");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ActionResponse::failed("internal error")),
            )
        }
    }
}

#[derive(Serialize)]
struct FaceCount {
    count: usize,
}

async fn face_count(State(ctx): AppState) -> Result<Json<FaceCount>, StatusCode> {
    match ctx.face_count() {
        Ok(count) => Ok(Json(FaceCount { count })),
        Err(e) => {
            log::warn!("Face count failed: {e}");
            Err(StatusCode::INTERNAL_SERVER_ERROR)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dualsight_core::app_context::Collaborators;
    use dualsight_core::capture::domain::frame_source::{CaptureError, FrameSource};
    use dualsight_core::detection::domain::face_encoder::{Embedding, FaceEncoder};
    use dualsight_core::detection::domain::face_locator::FaceLocator;
    use dualsight_core::detection::domain::object_tracker::{
        Detection, ObjectTracker, TrackOptions,
    };
    use dualsight_core::identity::infrastructure::fs_snapshot_store::FsSnapshotStore;
    use dualsight_core::identity::infrastructure::sqlite_identity_store::SqliteIdentityStore;
    use dualsight_core::shared::frame::Frame;
    use dualsight_core::shared::region::Region;
    use dualsight_core::shared::settings::Settings;
    use tempfile::TempDir;

    struct GreyCamera;

    impl FrameSource for GreyCamera {
        fn capture(&mut self) -> Result<Frame, CaptureError> {
            Ok(Frame::filled(64, 48, [128, 128, 128], 0))
        }

        fn release(&mut self) {}

        fn describe(&self) -> String {
            "grey test camera".to_string()
        }
    }

    struct OneFace;

    impl FaceLocator for OneFace {
        fn locate(&mut self, _frame: &Frame) -> Result<Vec<Region>, Box<dyn std::error::Error>> {
            Ok(vec![Region::new(2, 2, 6, 6)])
        }
    }

    struct FixedEncoder;

    impl FaceEncoder for FixedEncoder {
        fn encode(
            &mut self,
            _frame: &Frame,
            _face: &Region,
        ) -> Result<Embedding, Box<dyn std::error::Error>> {
            let mut values = vec![0.0; 128];
            values[0] = 1.0;
            Ok(Embedding::new(values))
        }
    }

    struct OnePerson {
        labels: Vec<String>,
    }

    impl ObjectTracker for OnePerson {
        fn detect_and_track(
            &mut self,
            _frame: &Frame,
            _options: TrackOptions,
        ) -> Result<Vec<Detection>, Box<dyn std::error::Error>> {
            Ok(vec![Detection {
                bbox: [10.0, 10.0, 100.0, 200.0],
                class_id: 0,
                confidence: 0.9,
                track_id: Some(1),
            }])
        }

        fn class_labels(&self) -> &[String] {
            &self.labels
        }
    }

    fn context(tmp: &TempDir) -> Arc<AppContext> {
        let collaborators = Collaborators {
            camera: Box::new(GreyCamera),
            face_locator: Box::new(OneFace),
            face_encoder: Box::new(FixedEncoder),
            object_tracker: Box::new(OnePerson {
                labels: vec!["person".to_string()],
            }),
            matcher: Arc::new(SqliteIdentityStore::open_in_memory(0.6).unwrap()),
            snapshots: Arc::new(FsSnapshotStore::open(tmp.path()).unwrap()),
        };
        Arc::new(AppContext::new(collaborators, &Settings::default()).unwrap())
    }

    fn register_request(name: &str, roll_no: &str) -> Json<RegisterRequest> {
        Json(RegisterRequest {
            name: name.to_string(),
            roll_no: roll_no.to_string(),
        })
    }

    #[tokio::test]
    async fn test_statuses_before_any_frame() {
        let tmp = TempDir::new().unwrap();
        let ctx = context(&tmp);

        let Json(status) = face_status(State(ctx.clone())).await;
        assert_eq!(status, FaceStatus::no_face());

        let Json(objects) = object_status(State(ctx)).await;
        assert!(objects.objects.is_empty());
    }

    #[tokio::test]
    async fn test_object_status_shape() {
        let tmp = TempDir::new().unwrap();
        let ctx = context(&tmp);
        ctx.object_stream().next_part().unwrap();

        let Json(objects) = object_status(State(ctx)).await;
        let json = serde_json::to_value(&objects).unwrap();
        assert_eq!(json, serde_json::json!({"objects": {"person": 1}}));
    }

    #[tokio::test]
    async fn test_register_count_delete() {
        let tmp = TempDir::new().unwrap();
        let ctx = context(&tmp);

        let (status, Json(body)) =
            register_face(State(ctx.clone()), register_request("Ada", "R1")).await;
        assert_eq!(status, StatusCode::OK);
        assert!(!body.success);
        assert!(body.message.is_some());

        ctx.face_stream().next_part().unwrap();
        let (_, Json(body)) = register_face(State(ctx.clone()), register_request("Ada", "R1")).await;
        assert_eq!(body, ActionResponse::ok());

        let Json(count) = face_count(State(ctx.clone())).await.unwrap();
        assert_eq!(count.count, 1);

        let (_, Json(body)) = register_face(State(ctx.clone()), register_request("Bob", "R1")).await;
        assert!(!body.success);

        let request = Json(DeleteRequest {
            roll_no: " R1 ".to_string(),
        });
        let (_, Json(body)) = delete_face(State(ctx.clone()), request).await;
        assert!(body.success);

        let request = Json(DeleteRequest {
            roll_no: "R1".to_string(),
        });
        let (_, Json(body)) = delete_face(State(ctx.clone()), request).await;
        assert!(!body.success);

        let Json(count) = face_count(State(ctx)).await.unwrap();
        assert_eq!(count.count, 0);
    }

    #[tokio::test]
    async fn test_missing_fields_rejected() {
        let tmp = TempDir::new().unwrap();
        let ctx = context(&tmp);
        ctx.face_stream().next_part().unwrap();

        let (status, Json(body)) = register_face(State(ctx), register_request("  ", "R2")).await;
        assert_eq!(status, StatusCode::OK);
        assert!(!body.success);
    }

    #[tokio::test]
    async fn test_video_feed_headers() {
        let tmp = TempDir::new().unwrap();
        let ctx = context(&tmp);

        let response = video_feed_face(State(ctx)).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers()[header::CONTENT_TYPE],
            multipart_content_type().as_str()
        );
        assert_eq!(response.headers()[header::CACHE_CONTROL], "no-cache");
    }

    #[test]
    fn test_action_response_omits_empty_message() {
        let json = serde_json::to_value(ActionResponse::ok()).unwrap();
        assert_eq!(json, serde_json::json!({"success": true}));
    }
}

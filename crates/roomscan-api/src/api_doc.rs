//! OpenAPI documentation, served at `/api/openapi.json` and browsable at `/docs`.

use utoipa::openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme};
use utoipa::{Modify, OpenApi};

use crate::error;
use crate::handlers;
use roomscan_core::models;

struct BearerAuth;

impl Modify for BearerAuth {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        let components = openapi.components.get_or_insert_with(Default::default);
        components.add_security_scheme(
            "bearer",
            SecurityScheme::Http(HttpBuilder::new().scheme(HttpAuthScheme::Bearer).build()),
        );
    }
}

#[derive(OpenApi)]
#[openapi(
    info(
        title = "RoomScan API",
        version = "0.1.0",
        description = "Upload 3D room scans, follow their conversion to GLB, and download the result."
    ),
    paths(
        handlers::health::health_check,
        handlers::scan_upload::upload_scan,
        handlers::scan_get::list_scans,
        handlers::scan_get::get_scan_status,
        handlers::scan_get::get_scan_info,
        handlers::scan_artifact::download_artifact,
        handlers::scan_delete::delete_scan,
        handlers::scan_events::scan_events,
    ),
    components(schemas(
        error::ErrorResponse,
        handlers::scan_upload::UploadResponse,
        handlers::scan_get::ScanStatusResponse,
        models::JobRecord,
        models::JobStatus,
        models::ScanMetadata,
        models::ProgressEvent,
    )),
    modifiers(&BearerAuth),
    tags(
        (name = "scans", description = "Scan upload, conversion status and retrieval"),
        (name = "health", description = "Liveness")
    )
)]
pub struct ApiDoc;

pub fn get_openapi_spec() -> utoipa::openapi::OpenApi {
    ApiDoc::openapi()
}

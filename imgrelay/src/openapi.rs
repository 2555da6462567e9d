//! OpenAPI documentation for the relay API.

use utoipa::OpenApi;

use crate::api;

#[derive(OpenApi)]
#[openapi(
    info(
        title = "imgrelay",
        description = "Upload relay: forwards browser image uploads to the configured image host \
        without exposing the host's API key."
    ),
    paths(api::handlers::upload::upload_image),
    components(schemas(
        api::models::upload::UploadForm,
        api::models::upload::ErrorEnvelope,
        api::models::upload::HostedImageResponse,
        api::models::upload::HostedImage,
        api::models::upload::HostError,
    )),
    tags((name = "upload", description = "Image upload relay"))
)]
pub struct ApiDoc;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_openapi_documents_upload_endpoint() {
        let doc = ApiDoc::openapi();
        let json = serde_json::to_value(&doc).unwrap();

        let upload = &json["paths"]["/api/upload"]["post"];
        assert!(upload.is_object());
        assert!(upload["requestBody"]["content"]["multipart/form-data"].is_object());
        for status in ["200", "400", "413", "500"] {
            assert!(upload["responses"][status].is_object(), "missing {status} response");
        }
        assert!(json["components"]["schemas"]["ErrorEnvelope"].is_object());
    }
}

use std::sync::Arc;

use image::RgbaImage;
use tracing::debug;

use crate::color::CHROMA_KEY;
use crate::effects::{EditMode, ModeSet};
use crate::error::RemoteError;
use crate::frames::Frame;
use crate::pipeline::CancellationFlag;
use crate::remote::retry::RetryPolicy;
use crate::remote::service::{EditRequest, EditResponse, ImageEditService, ResponsePart};

const PRESERVE_BACKGROUND: &str = "Keep the background exactly as it is.";

const QUALITY_CONSTRAINTS: &str = "The result must look photorealistic and clean, \
with no added noise, grain, artifacts or text. Output only the edited image.";

/// A single remote edit call with retry and response validation
pub struct RemoteEditClient {
    service: Arc<dyn ImageEditService>,
    retry: RetryPolicy,
}

impl RemoteEditClient {
    pub fn new(service: Arc<dyn ImageEditService>, retry: RetryPolicy) -> Self {
        Self { service, retry }
    }

    /// Caller text plus the mode-specific and fixed quality clauses
    pub fn build_instruction(instruction: &str, modes: &ModeSet) -> String {
        let background = if modes.contains(EditMode::RemoveBackground) {
            format!(
                "Replace the entire background with a solid, flat pure green ({}) chroma-key color. \
                 Preserve every detail of the subject, including fine edges like hair and fur.",
                CHROMA_KEY.to_hex().to_uppercase()
            )
        } else {
            PRESERVE_BACKGROUND.to_string()
        };

        format!("{} {} {}", instruction.trim(), background, QUALITY_CONSTRAINTS)
    }

    /// Edit one frame remotely and return the decoded result
    pub async fn edit(
        &self,
        frame: &Frame,
        instruction: &str,
        modes: &ModeSet,
    ) -> Result<RgbaImage, RemoteError> {
        self.edit_until_cancelled(frame, instruction, modes, &CancellationFlag::new())
            .await
    }

    /// [`RemoteEditClient::edit`] whose retry waits end when `cancel` is raised
    pub async fn edit_until_cancelled(
        &self,
        frame: &Frame,
        instruction: &str,
        modes: &ModeSet,
        cancel: &CancellationFlag,
    ) -> Result<RgbaImage, RemoteError> {
        let image = frame.to_png_bytes().map_err(|e| RemoteError::Transport {
            reason: format!("could not encode request image: {}", e),
        })?;

        let request = EditRequest {
            image,
            mime_type: "image/png".to_string(),
            instruction: Self::build_instruction(instruction, modes),
        };

        let request = &request;
        let service = self.service.as_ref();
        let response = self
            .retry
            .run_until_cancelled(cancel, move |attempt| async move {
                if attempt > 0 {
                    debug!("Retrying remote edit on {} (attempt {})", service.name(), attempt + 1);
                }
                service.edit(request).await
            })
            .await?;

        let bytes = Self::extract_image(response)?;
        let decoded = image::load_from_memory(&bytes)
            .map_err(|e| RemoteError::UndecodableImage { reason: e.to_string() })?;

        Ok(decoded.to_rgba8())
    }

    /// Pull the first inline image out of a response
    pub fn extract_image(response: EditResponse) -> Result<Vec<u8>, RemoteError> {
        if response.parts.is_empty() {
            return Err(RemoteError::NoContent {
                finish_reason: response.finish_reason,
            });
        }

        response
            .parts
            .into_iter()
            .find_map(|part| match part {
                ResponsePart::InlineImage { data, .. } if !data.is_empty() => Some(data),
                _ => None,
            })
            .ok_or(RemoteError::NoImageInResponse)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use parking_lot::Mutex;

    /// Replays canned responses and records every request
    struct ScriptedService {
        script: Mutex<Vec<Result<EditResponse, RemoteError>>>,
        seen: Mutex<Vec<String>>,
    }

    impl ScriptedService {
        fn new(mut script: Vec<Result<EditResponse, RemoteError>>) -> Self {
            script.reverse();
            Self {
                script: Mutex::new(script),
                seen: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl ImageEditService for ScriptedService {
        fn name(&self) -> &str {
            "scripted"
        }

        async fn edit(&self, request: &EditRequest) -> Result<EditResponse, RemoteError> {
            self.seen.lock().push(request.instruction.clone());
            self.script
                .lock()
                .pop()
                .unwrap_or(Err(RemoteError::Http { status: 500, message: "script exhausted".into() }))
        }
    }

    fn image_response(frame: &Frame) -> EditResponse {
        EditResponse {
            parts: vec![ResponsePart::InlineImage {
                mime_type: "image/png".into(),
                data: frame.to_png_bytes().unwrap(),
            }],
            finish_reason: Some("STOP".into()),
        }
    }

    #[test]
    fn test_instruction_for_background_removal() {
        let modes = ModeSet::new().with(EditMode::RemoveBackground);
        let text = RemoteEditClient::build_instruction("Cut out the cat.", &modes);
        assert!(text.starts_with("Cut out the cat."));
        assert!(text.contains("#00FF00"));
        assert!(text.ends_with("Output only the edited image."));
    }

    #[test]
    fn test_instruction_preserves_background_otherwise() {
        let modes = ModeSet::new().with(EditMode::Recolor);
        let text = RemoteEditClient::build_instruction("Make the car blue.", &modes);
        assert!(text.contains(PRESERVE_BACKGROUND));
        assert!(!text.contains("#00FF00"));
    }

    #[test]
    fn test_extract_image_errors() {
        let empty = EditResponse { parts: vec![], finish_reason: Some("SAFETY".into()) };
        assert!(matches!(
            RemoteEditClient::extract_image(empty),
            Err(RemoteError::NoContent { finish_reason: Some(ref r) }) if r == "SAFETY"
        ));

        let text_only = EditResponse {
            parts: vec![ResponsePart::Text("sorry".into())],
            finish_reason: None,
        };
        assert!(matches!(
            RemoteEditClient::extract_image(text_only),
            Err(RemoteError::NoImageInResponse)
        ));
    }

    #[tokio::test]
    async fn test_edit_retries_quota_then_succeeds() {
        let frame = Frame::new_filled(4, 4, [0, 0, 255, 255], 100);
        let service = Arc::new(ScriptedService::new(vec![
            Err(RemoteError::Http { status: 429, message: String::new() }),
            Ok(image_response(&frame)),
        ]));
        let client = RemoteEditClient::new(service.clone(), RetryPolicy::immediate(3));

        let image = client
            .edit(&frame, "recolor", &ModeSet::new().with(EditMode::Recolor))
            .await
            .unwrap();

        assert_eq!(image.dimensions(), (4, 4));
        assert_eq!(image.get_pixel(1, 1).0, [0, 0, 255, 255]);
        assert_eq!(service.seen.lock().len(), 2);
    }

    #[tokio::test]
    async fn test_undecodable_image() {
        let service = Arc::new(ScriptedService::new(vec![Ok(EditResponse {
            parts: vec![ResponsePart::InlineImage { mime_type: "image/png".into(), data: vec![1, 2, 3] }],
            finish_reason: None,
        })]));
        let client = RemoteEditClient::new(service, RetryPolicy::immediate(3));
        let frame = Frame::new_filled(2, 2, [0, 0, 0, 255], 100);

        let result = client.edit(&frame, "x", &ModeSet::new().with(EditMode::Recolor)).await;
        assert!(matches!(result, Err(RemoteError::UndecodableImage { .. })));
    }
}

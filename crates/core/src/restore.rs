//! Restoration requests against the remote image-editing model.
//!
//! [`RestorationClient`] wraps any [`ImageEditor`], pairing the image with
//! the fixed restoration instructions and picking the edited image out of
//! the model's answer. The production editor lives in [`crate::gemini`].

use crate::encoding::EncodedImage;
use crate::error::{AppError, Result};
use serde::{Deserialize, Serialize};
use std::future::Future;
use tracing::{debug, info};

/// Instructions sent with every restoration request. Not user-configurable.
pub const RESTORATION_INSTRUCTIONS: &str = "\
TASK: Exam Paper Restoration
INPUT: A photo of a completed exam paper with handwriting, ink marks, and background noise.
INSTRUCTIONS:
1. Identify and REMOVE all handwritten marks, ink scribbles, and pen notations of any color (blue, black, red).
2. RETAIN all original printed text, mathematical symbols, formulas, and printed lines/grids of the paper.
3. NORMALIZE the background to be pure clean white.
4. ENHANCE the contrast of the printed text to be sharp black (#000000).
5. Ensure the final result looks like a clean, blank, digital-original exam paper ready for printing.
6. Maintain high resolution and clarity of original printed fonts.
";

/// Inline image data as carried on the wire: base64 payload plus MIME type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InlineImage {
    pub data: String,
    pub mime_type: String,
}

/// One restoration request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RestoreRequest {
    pub image: InlineImage,
    pub instructions: String,
}

/// A single piece of a candidate's content.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResponsePart {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub inline_image: Option<InlineImage>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CandidateContent {
    #[serde(default)]
    pub parts: Vec<ResponsePart>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Candidate {
    #[serde(default)]
    pub content: CandidateContent,
}

/// The model's answer: zero or more candidates.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RestoreResponse {
    #[serde(default)]
    pub candidates: Vec<Candidate>,
}

/// A remote capability that edits an image according to instructions.
///
/// Implementations report transport and API failures as
/// [`AppError::Service`]. Interpreting the answer is left to
/// [`RestorationClient`].
pub trait ImageEditor {
    fn edit(&self, request: RestoreRequest) -> impl Future<Output = Result<RestoreResponse>>;
}

/// Sends images for restoration and extracts the edited result.
pub struct RestorationClient<E> {
    editor: E,
}

impl<E: ImageEditor> RestorationClient<E> {
    pub fn new(editor: E) -> Self {
        Self { editor }
    }

    pub fn editor(&self) -> &E {
        &self.editor
    }

    /// Restores one image.
    ///
    /// Service failures are returned unchanged; there is no retry.
    ///
    /// # Errors
    ///
    /// - [`AppError::EmptyResponse`] if the model returned no candidates
    /// - [`AppError::NoImagePart`] if the first candidate has no image part
    /// - [`AppError::Service`] for transport or API failures
    pub async fn restore(&self, image: &EncodedImage, mime_type: &str) -> Result<EncodedImage> {
        let request = RestoreRequest {
            image: InlineImage {
                data: image.payload().to_string(),
                mime_type: mime_type.to_string(),
            },
            instructions: RESTORATION_INSTRUCTIONS.to_string(),
        };

        debug!(mime_type, payload_len = image.payload().len(), "submitting restoration request");
        let response = self.editor.edit(request).await?;
        extract_image(&response)
    }
}

/// Picks the first inline image out of the first candidate.
pub fn extract_image(response: &RestoreResponse) -> Result<EncodedImage> {
    let candidate = response.candidates.first().ok_or(AppError::EmptyResponse)?;

    for part in &candidate.content.parts {
        if let Some(inline) = &part.inline_image {
            return verified_image(inline);
        }
    }

    let text: Vec<&str> = candidate
        .content
        .parts
        .iter()
        .filter_map(|part| part.text.as_deref())
        .collect();
    if !text.is_empty() {
        info!("model answered with text only");
        debug!(text = %text.join("\n"), "model text");
    }

    Err(AppError::NoImagePart)
}

/// Wraps inline image data after checking that it decodes as the declared type.
fn verified_image(inline: &InlineImage) -> Result<EncodedImage> {
    let image = EncodedImage::from_base64(inline.mime_type.as_str(), inline.data.as_str())?;
    let bytes = image.decode_bytes()?;

    let format = image::guess_format(&bytes)
        .map_err(|e| AppError::encoding(format!("returned data is not an image: {}", e)))?;
    if format.to_mime_type() != inline.mime_type {
        return Err(AppError::encoding(format!(
            "returned image is declared as {} but contains {}",
            inline.mime_type,
            format.to_mime_type()
        )));
    }
    image::load_from_memory_with_format(&bytes, format)
        .map_err(|e| AppError::encoding(format!("returned image does not decode: {}", e)))?;

    Ok(image)
}

#[cfg(test)]
pub(crate) mod testing {
    //! A scripted editor for exercising the client and the workflow offline.

    use super::*;
    use std::cell::RefCell;
    use std::collections::VecDeque;

    /// What the scripted editor does on its next call.
    #[derive(Debug, Clone)]
    pub enum Reply {
        Respond(RestoreResponse),
        Fail(String),
    }

    #[derive(Default)]
    pub struct ScriptedEditor {
        replies: RefCell<VecDeque<Reply>>,
        pub requests: RefCell<Vec<RestoreRequest>>,
    }

    impl ScriptedEditor {
        pub fn new(replies: impl IntoIterator<Item = Reply>) -> Self {
            Self {
                replies: RefCell::new(replies.into_iter().collect()),
                requests: RefCell::default(),
            }
        }
    }

    impl ImageEditor for ScriptedEditor {
        async fn edit(&self, request: RestoreRequest) -> Result<RestoreResponse> {
            self.requests.borrow_mut().push(request);
            match self.replies.borrow_mut().pop_front() {
                Some(Reply::Respond(response)) => Ok(response),
                Some(Reply::Fail(msg)) => Err(AppError::service(msg)),
                None => Err(AppError::service("no scripted reply left")),
            }
        }
    }

    pub fn text_part(text: &str) -> ResponsePart {
        ResponsePart { text: Some(text.to_string()), inline_image: None }
    }

    pub fn image_part(image: &EncodedImage) -> ResponsePart {
        ResponsePart {
            text: None,
            inline_image: Some(InlineImage {
                data: image.payload().to_string(),
                mime_type: image.mime_type().to_string(),
            }),
        }
    }

    pub fn response(parts: Vec<ResponsePart>) -> RestoreResponse {
        RestoreResponse {
            candidates: vec![Candidate { content: CandidateContent { parts } }],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::testing::*;
    use super::*;
    use crate::encoding::{encode_bytes, jpeg_bytes, png_bytes};

    fn page() -> EncodedImage {
        encode_bytes(&png_bytes(8, 8)).unwrap()
    }

    #[tokio::test]
    async fn request_carries_stripped_payload_and_fixed_instructions() {
        let source = page();
        let editor = ScriptedEditor::new([Reply::Respond(response(vec![image_part(&source)]))]);
        let client = RestorationClient::new(editor);

        client.restore(&source, "image/png").await.unwrap();

        let requests = client.editor().requests.borrow();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].image.data, source.payload());
        assert!(!requests[0].image.data.starts_with("data:"));
        assert_eq!(requests[0].image.mime_type, "image/png");
        assert_eq!(requests[0].instructions, RESTORATION_INSTRUCTIONS);
    }

    #[tokio::test]
    async fn first_inline_image_wins() {
        let restored = encode_bytes(&jpeg_bytes(6, 4)).unwrap();
        let other = encode_bytes(&png_bytes(3, 3)).unwrap();
        let editor = ScriptedEditor::new([Reply::Respond(response(vec![
            text_part("Here is the cleaned page"),
            image_part(&restored),
            image_part(&other),
        ]))]);

        let result = RestorationClient::new(editor)
            .restore(&page(), "image/png")
            .await
            .unwrap();

        assert_eq!(result, restored);
        assert_eq!(result.mime_type(), "image/jpeg");
        assert_eq!(result.decode_bytes().unwrap(), jpeg_bytes(6, 4));
    }

    #[tokio::test]
    async fn no_candidates_is_empty_response() {
        let editor = ScriptedEditor::new([Reply::Respond(RestoreResponse::default())]);
        let err = RestorationClient::new(editor)
            .restore(&page(), "image/png")
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::EmptyResponse));
    }

    #[tokio::test]
    async fn text_only_is_no_image_part() {
        let editor = ScriptedEditor::new([Reply::Respond(response(vec![text_part(
            "I cannot edit this image.",
        )]))]);
        let err = RestorationClient::new(editor)
            .restore(&page(), "image/png")
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::NoImagePart));
        assert!(err.is_unusable_response());
    }

    #[tokio::test]
    async fn only_the_first_candidate_is_considered() {
        let mut reply = response(vec![text_part("nope")]);
        reply.candidates.push(Candidate {
            content: CandidateContent { parts: vec![image_part(&page())] },
        });
        let editor = ScriptedEditor::new([Reply::Respond(reply)]);

        let err = RestorationClient::new(editor)
            .restore(&page(), "image/png")
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::NoImagePart));
    }

    #[tokio::test]
    async fn service_failure_propagates_unchanged() {
        let editor = ScriptedEditor::new([Reply::Fail("401 API key not valid".into())]);
        let client = RestorationClient::new(editor);

        let err = client.restore(&page(), "image/png").await.unwrap_err();
        match err {
            AppError::Service(msg) => assert_eq!(msg, "401 API key not valid"),
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(client.editor().requests.borrow().len(), 1);
    }

    #[test]
    fn response_shape_deserializes_from_camel_case_json() {
        let restored = page();
        let json = format!(
            r#"{{
            "candidates": [{{
                "content": {{
                    "parts": [
                        {{ "text": "done" }},
                        {{ "inlineImage": {{ "data": "{}", "mimeType": "image/png" }} }}
                    ]
                }}
            }}]
        }}"#,
            restored.payload()
        );
        let response: RestoreResponse = serde_json::from_str(&json).unwrap();
        let image = extract_image(&response).unwrap();
        assert_eq!(image.mime_type(), "image/png");
        assert_eq!(image.decode_bytes().unwrap(), png_bytes(8, 8));
    }

    #[test]
    fn image_declared_with_the_wrong_type_is_an_encoding_error() {
        let reply = response(vec![ResponsePart {
            text: None,
            inline_image: Some(InlineImage {
                data: page().payload().to_string(),
                mime_type: "image/jpeg".into(),
            }),
        }]);
        assert!(matches!(extract_image(&reply), Err(AppError::Encoding(_))));
    }

    #[test]
    fn non_image_payload_is_an_encoding_error() {
        // "aGk=" is the two bytes "hi".
        let reply = response(vec![ResponsePart {
            text: None,
            inline_image: Some(InlineImage {
                data: "aGk=".into(),
                mime_type: "image/png".into(),
            }),
        }]);
        assert!(matches!(extract_image(&reply), Err(AppError::Encoding(_))));
    }

    #[test]
    fn truncated_image_is_an_encoding_error() {
        let mut bytes = png_bytes(8, 8);
        bytes.truncate(40);
        let reply = response(vec![ResponsePart {
            text: None,
            inline_image: Some(InlineImage {
                data: EncodedImage::from_bytes("image/png", &bytes).payload().to_string(),
                mime_type: "image/png".into(),
            }),
        }]);
        assert!(matches!(extract_image(&reply), Err(AppError::Encoding(_))));
    }

    #[test]
    fn invalid_base64_in_response_is_an_encoding_error() {
        let reply = response(vec![ResponsePart {
            text: None,
            inline_image: Some(InlineImage {
                data: "***".into(),
                mime_type: "image/png".into(),
            }),
        }]);
        assert!(matches!(extract_image(&reply), Err(AppError::Encoding(_))));
    }
}

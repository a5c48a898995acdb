use super::ImageBackend;
use crate::error::CallFailure;
use crate::models::GenerationRequest;
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

type Response = Result<Vec<u8>, CallFailure>;

/// Scripted backend: queued responses are returned in order, then the
/// fallback (or a tiny valid PNG) on every further call.
#[derive(Clone, Default)]
pub struct MockImageBackend {
    responses: Arc<Mutex<VecDeque<Response>>>,
    fallback: Arc<Mutex<Option<Response>>>,
    requests: Arc<Mutex<Vec<GenerationRequest>>>,
}

impl MockImageBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_image_response(self, response: Vec<u8>) -> Self {
        self.responses.lock().unwrap().push_back(Ok(response));
        self
    }

    pub fn with_failure(self, failure: CallFailure) -> Self {
        self.responses.lock().unwrap().push_back(Err(failure));
        self
    }

    pub fn with_failures(self, failure: CallFailure, times: usize) -> Self {
        self.responses
            .lock()
            .unwrap()
            .extend(std::iter::repeat(Err(failure)).take(times));
        self
    }

    pub fn with_fallback(self, response: Response) -> Self {
        *self.fallback.lock().unwrap() = Some(response);
        self
    }

    pub fn get_call_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    pub fn get_requests(&self) -> Vec<GenerationRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn get_prompts(&self) -> Vec<String> {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .map(|r| r.prompt().to_string())
            .collect()
    }
}

/// A 1x1 PNG, encoded on demand so it is always decodable.
pub fn tiny_png() -> Vec<u8> {
    let img = image::RgbaImage::from_pixel(1, 1, image::Rgba([255, 255, 255, 255]));
    let mut bytes = Vec::new();
    img.write_to(
        &mut std::io::Cursor::new(&mut bytes),
        image::ImageFormat::Png,
    )
    .expect("encoding a 1x1 PNG into memory cannot fail");
    bytes
}

#[async_trait]
impl ImageBackend for MockImageBackend {
    async fn generate(&self, request: &GenerationRequest) -> Result<Vec<u8>, CallFailure> {
        self.requests.lock().unwrap().push(request.clone());

        if let Some(response) = self.responses.lock().unwrap().pop_front() {
            return response;
        }

        match self.fallback.lock().unwrap().as_ref() {
            Some(response) => response.clone(),
            None => Ok(tiny_png()),
        }
    }
}

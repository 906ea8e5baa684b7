use std::marker::PhantomData;

use crate::error::Result;
use crate::records::RecordQuality;

use super::Transform;

/// Identity transform for reference entities (shops, services, staff)
/// whose analytical shape matches the source shape. Still runs the quality
/// gate on both sides of `transform_batch`.
pub struct PassthroughTransformer<R> {
    _marker: PhantomData<R>,
}

impl<R> PassthroughTransformer<R> {
    pub fn new() -> Self {
        Self {
            _marker: PhantomData,
        }
    }
}

impl<R> Default for PassthroughTransformer<R> {
    fn default() -> Self {
        Self::new()
    }
}

impl<R: RecordQuality> Transform for PassthroughTransformer<R> {
    type Input = R;
    type Output = R;

    fn transform(&self, chunk: Vec<R>) -> Result<Vec<R>> {
        Ok(chunk)
    }
}

use serde::Deserialize;

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Most idle message buffers a connection keeps for reuse.
    pub buffer_pool_size: usize,
    /// Initial capacity of a freshly allocated message buffer.
    pub buffer_capacity: usize,
    /// Buffers that grew past this are dropped on return instead of pooled.
    pub max_retained_capacity: usize,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            buffer_pool_size: 16,
            buffer_capacity: 1024,
            max_retained_capacity: 1024 * 1024,
        }
    }
}

impl ClientConfig {
    pub fn from_json(s: &str) -> crate::Result<Self> {
        Ok(serde_json::from_str(s)?)
    }

    pub fn set_buffer_pool_size(&mut self, n: usize) -> &mut Self {
        self.buffer_pool_size = n;
        self
    }

    pub fn set_buffer_capacity(&mut self, n: usize) -> &mut Self {
        self.buffer_capacity = n;
        self
    }

    pub fn set_max_retained_capacity(&mut self, n: usize) -> &mut Self {
        self.max_retained_capacity = n;
        self
    }
}

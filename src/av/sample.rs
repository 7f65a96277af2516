use bytes::Bytes;

/// One encoded access unit, timed in the owning track's timescale.
#[derive(Debug, Clone)]
pub struct Sample {
    pub data: Bytes,
    pub pts: i64,
    pub duration: u32,
    pub is_key: bool,
}

impl Sample {
    pub fn new(data: impl Into<Bytes>) -> Self {
        Self {
            data: data.into(),
            pts: 0,
            duration: 0,
            is_key: false,
        }
    }

    pub fn with_pts(mut self, pts: i64) -> Self {
        self.pts = pts;
        self
    }

    pub fn with_duration(mut self, duration: u32) -> Self {
        self.duration = duration;
        self
    }

    pub fn with_key_flag(mut self, is_key: bool) -> Self {
        self.is_key = is_key;
        self
    }

    pub fn size(&self) -> usize {
        self.data.len()
    }
}

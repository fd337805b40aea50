use async_trait::async_trait;
use hallway_session::{
    LocalMedia, MediaConstraints, MediaDevices, MediaError, SyntheticMediaDevices,
};
use std::sync::Mutex;

/// Media devices that either deny every request or hand out synthetic tracks, keeping a
/// handle on each stream so tests can check it was stopped.
#[derive(Default)]
pub struct MockMediaDevices {
    deny: bool,
    requests: Mutex<usize>,
    issued: Mutex<Vec<LocalMedia>>,
}

impl MockMediaDevices {
    pub fn granting() -> Self {
        Self::default()
    }

    pub fn denying() -> Self {
        Self {
            deny: true,
            ..Self::default()
        }
    }

    pub fn requests(&self) -> usize {
        *self.requests.lock().unwrap()
    }

    pub fn issued(&self) -> Vec<LocalMedia> {
        self.issued.lock().unwrap().clone()
    }
}

#[async_trait]
impl MediaDevices for MockMediaDevices {
    async fn get_user_media(&self, constraints: MediaConstraints) -> Result<LocalMedia, MediaError> {
        *self.requests.lock().unwrap() += 1;
        if self.deny {
            return Err(MediaError::Denied);
        }
        let media = SyntheticMediaDevices::default()
            .get_user_media(constraints)
            .await?;
        self.issued.lock().unwrap().push(media.clone());
        Ok(media)
    }
}

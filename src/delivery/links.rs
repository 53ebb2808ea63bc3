use serde::Serialize;

use crate::core::types::{ContainerId, ObjectId};

/// Links handed out for one published file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ShareLinks {
    pub file_name: String,
    pub stream_url: String,
    pub player_url: String,
}

impl ShareLinks {
    pub fn build(
        public_base_url: &str,
        player_base_url: &str,
        container_id: ContainerId,
        object_id: ObjectId,
        file_name: &str,
    ) -> Self {
        let stream = stream_url(public_base_url, container_id, object_id);
        let player = player_url(player_base_url, &stream, file_name);
        Self {
            file_name: file_name.to_string(),
            stream_url: stream,
            player_url: player,
        }
    }
}

/// `<base>/stream/<container>/<object>`
pub fn stream_url(public_base_url: &str, container_id: ContainerId, object_id: ObjectId) -> String {
    format!(
        "{}/stream/{}/{}",
        public_base_url.trim_end_matches('/'),
        container_id,
        object_id
    )
}

/// Web player page pointed at `stream_url`.
pub fn player_url(player_base_url: &str, stream_url: &str, file_name: &str) -> String {
    format!(
        "{}/?src={}&name={}",
        player_base_url.trim_end_matches('/'),
        urlencoding::encode(stream_url),
        urlencoding::encode(file_name)
    )
}

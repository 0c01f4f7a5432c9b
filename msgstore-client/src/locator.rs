//! The `FileLocator` data model: the opaque descriptor sufficient to fetch
//! any byte range of a file from the backend.

use bytes::Bytes;

/// Discriminates which backend location record a `FileLocator` maps to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileType {
    Document,
    Photo,
    ChatPhoto,
}

/// Opaque descriptor for a file stored on the backend.
///
/// Immutable once constructed. `file_reference` may go stale at the backend;
/// that surfaces as a retryable error from the fetcher, not as a mutation of
/// this value.
#[derive(Debug, Clone)]
pub struct FileLocator {
    pub dc_id: i32,
    pub file_type: FileType,
    pub media_id: i64,
    pub access_hash: i64,
    pub file_reference: Bytes,
    pub thumbnail_size: String,

    /// Only meaningful when `file_type == FileType::ChatPhoto`.
    pub chat_photo: Option<ChatPhotoLocation>,
}

/// The extra fields a `ChatPhoto` locator carries, and the chat peer they
/// resolve against.
#[derive(Debug, Clone)]
pub struct ChatPhotoLocation {
    pub volume_id: i64,
    pub local_id: i32,
    pub chat_id: i64,
    pub chat_access_hash: i64,
    pub thumb_big: bool,
}

/// The kind of chat a `ChatPhoto` locator's owner is, derived from
/// `chat_id`'s sign and `chat_access_hash`'s zero-ness.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChatPeer {
    User { user_id: i64, access_hash: i64 },
    Chat { chat_id: i64 },
    Channel { channel_id: i64, access_hash: i64 },
}

impl ChatPhotoLocation {
    /// Computes the chat peer this chat photo belongs to.
    ///
    /// Mirrors `_create_chat_peer` in the original streamer: a positive
    /// `chat_id` is a user; a negative one with a zero access hash is a
    /// small chat; otherwise it's a channel, masked down to 63 bits.
    pub fn chat_peer(&self) -> ChatPeer {
        if self.chat_id > 0 {
            return ChatPeer::User {
                user_id: self.chat_id,
                access_hash: self.chat_access_hash,
            };
        }

        if self.chat_access_hash == 0 {
            return ChatPeer::Chat {
                chat_id: -self.chat_id,
            };
        }

        ChatPeer::Channel {
            channel_id: self.chat_id & 0x7FFF_FFFF_FFFF_FFFF,
            access_hash: self.chat_access_hash,
        }
    }
}

impl FileLocator {
    pub fn document(
        dc_id: i32,
        media_id: i64,
        access_hash: i64,
        file_reference: Bytes,
        thumbnail_size: String,
    ) -> Self {
        Self {
            dc_id,
            file_type: FileType::Document,
            media_id,
            access_hash,
            file_reference,
            thumbnail_size,
            chat_photo: None,
        }
    }

    pub fn photo(
        dc_id: i32,
        media_id: i64,
        access_hash: i64,
        file_reference: Bytes,
        thumbnail_size: String,
    ) -> Self {
        Self {
            dc_id,
            file_type: FileType::Photo,
            media_id,
            access_hash,
            file_reference,
            thumbnail_size,
            chat_photo: None,
        }
    }

    pub fn chat_photo(dc_id: i32, chat_photo: ChatPhotoLocation) -> Self {
        Self {
            dc_id,
            file_type: FileType::ChatPhoto,
            media_id: 0,
            access_hash: 0,
            file_reference: Bytes::new(),
            thumbnail_size: String::new(),
            chat_photo: Some(chat_photo),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chat_peer_positive_id_is_user() {
        let loc = ChatPhotoLocation {
            volume_id: 1,
            local_id: 1,
            chat_id: 42,
            chat_access_hash: 777,
            thumb_big: false,
        };
        assert_eq!(
            loc.chat_peer(),
            ChatPeer::User {
                user_id: 42,
                access_hash: 777
            }
        );
    }

    #[test]
    fn chat_peer_negative_id_zero_hash_is_small_chat() {
        let loc = ChatPhotoLocation {
            volume_id: 1,
            local_id: 1,
            chat_id: -42,
            chat_access_hash: 0,
            thumb_big: false,
        };
        assert_eq!(loc.chat_peer(), ChatPeer::Chat { chat_id: 42 });
    }

    #[test]
    fn chat_peer_negative_id_nonzero_hash_is_channel() {
        let loc = ChatPhotoLocation {
            volume_id: 1,
            local_id: 1,
            chat_id: -1_000_100_123_456,
            chat_access_hash: 999,
            thumb_big: true,
        };
        match loc.chat_peer() {
            ChatPeer::Channel {
                channel_id,
                access_hash,
            } => {
                assert_eq!(channel_id, -1_000_100_123_456i64 & 0x7FFF_FFFF_FFFF_FFFF);
                assert_eq!(access_hash, 999);
            }
            other => panic!("expected Channel, got {other:?}"),
        }
    }
}

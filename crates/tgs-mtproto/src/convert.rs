//! Conversions between raw TL objects and core domain types.

use grammers_tl_types as tl;
use tgs_core::{
    domain::{ListedStory, PeerHandle, PeerKind, RemoteStory, StoryId},
    media::{
        DocumentDescriptor, FileAttribute, FileHandle, FileKind, FileLocation, MediaRef,
        NativeMedia, PhotoDescriptor,
    },
};

pub(crate) fn input_peer(peer: &PeerHandle) -> tl::enums::InputPeer {
    match peer.kind {
        PeerKind::Channel | PeerKind::Group => {
            tl::enums::InputPeer::Channel(tl::types::InputPeerChannel {
                channel_id: peer.id,
                access_hash: peer.access_hash,
            })
        }
        PeerKind::User => tl::enums::InputPeer::User(tl::types::InputPeerUser {
            user_id: peer.id,
            access_hash: peer.access_hash,
        }),
    }
}

pub(crate) fn listed_story(raw: tl::enums::StoryItem) -> ListedStory {
    match raw {
        tl::enums::StoryItem::Item(item) => {
            let media = media_ref(&item.media);
            let native = media.as_ref().map(|_| NativeMedia::new(item.media.clone()));
            ListedStory::Item(RemoteStory {
                id: StoryId(i64::from(item.id)),
                date: i64::from(item.date),
                caption: item.caption,
                media,
                native,
            })
        }
        tl::enums::StoryItem::Skipped(s) => ListedStory::Skipped(StoryId(i64::from(s.id))),
        tl::enums::StoryItem::Deleted(s) => ListedStory::Deleted(StoryId(i64::from(s.id))),
    }
}

/// Decide the downloadable part of a story's media, if there is one.
pub(crate) fn media_ref(media: &tl::enums::MessageMedia) -> Option<MediaRef> {
    match media {
        tl::enums::MessageMedia::Photo(m) => match m.photo.as_ref()? {
            tl::enums::Photo::Photo(photo) => {
                let (thumb_size, size) = largest_size(&photo.sizes)?;
                Some(MediaRef::Photo(PhotoDescriptor {
                    file: FileHandle {
                        dc_id: photo.dc_id,
                        id: photo.id,
                        access_hash: photo.access_hash,
                        file_reference: photo.file_reference.clone(),
                    },
                    thumb_size,
                    size,
                }))
            }
            tl::enums::Photo::Empty(_) => None,
        },
        tl::enums::MessageMedia::Document(m) => match m.document.as_ref()? {
            tl::enums::Document::Document(doc) => Some(MediaRef::Document(DocumentDescriptor {
                file: FileHandle {
                    dc_id: doc.dc_id,
                    id: doc.id,
                    access_hash: doc.access_hash,
                    file_reference: doc.file_reference.clone(),
                },
                mime_type: doc.mime_type.clone(),
                size: u64::try_from(doc.size).unwrap_or(0),
                attributes: doc.attributes.iter().filter_map(attribute).collect(),
            })),
            tl::enums::Document::Empty(_) => None,
        },
        _ => None,
    }
}

pub(crate) fn input_location(loc: &FileLocation) -> tl::enums::InputFileLocation {
    match &loc.kind {
        FileKind::Photo { thumb_size } => {
            tl::enums::InputFileLocation::InputPhotoFileLocation(tl::types::InputPhotoFileLocation {
                id: loc.file.id,
                access_hash: loc.file.access_hash,
                file_reference: loc.file.file_reference.clone(),
                thumb_size: thumb_size.clone(),
            })
        }
        FileKind::Document => tl::enums::InputFileLocation::InputDocumentFileLocation(
            tl::types::InputDocumentFileLocation {
                id: loc.file.id,
                access_hash: loc.file.access_hash,
                file_reference: loc.file.file_reference.clone(),
                thumb_size: String::new(),
            },
        ),
    }
}

/// Pick the biggest rendition: `(size class, byte size if known)`.
pub(crate) fn largest_size(sizes: &[tl::enums::PhotoSize]) -> Option<(String, Option<u64>)> {
    sizes
        .iter()
        .filter_map(|s| match s {
            tl::enums::PhotoSize::Size(s) => {
                Some((s.w * s.h, s.r#type.clone(), u64::try_from(s.size).ok()))
            }
            tl::enums::PhotoSize::Progressive(s) => Some((
                s.w * s.h,
                s.r#type.clone(),
                s.sizes.iter().max().and_then(|b| u64::try_from(*b).ok()),
            )),
            _ => None,
        })
        .max_by_key(|(area, _, _)| *area)
        .map(|(_, ty, size)| (ty, size))
}

fn attribute(raw: &tl::enums::DocumentAttribute) -> Option<FileAttribute> {
    match raw {
        tl::enums::DocumentAttribute::Video(v) => Some(FileAttribute::Video {
            duration_secs: f64::from(v.duration),
            width: v.w,
            height: v.h,
        }),
        tl::enums::DocumentAttribute::ImageSize(s) => Some(FileAttribute::ImageSize {
            width: s.w,
            height: s.h,
        }),
        tl::enums::DocumentAttribute::Filename(f) => Some(FileAttribute::FileName(f.file_name.clone())),
        tl::enums::DocumentAttribute::Animated => Some(FileAttribute::Animated),
        _ => None,
    }
}

/// RPC errors that mean "no such peer" rather than a failed lookup.
pub(crate) fn is_missing_peer(rpc_name: &str) -> bool {
    matches!(
        rpc_name,
        "USERNAME_NOT_OCCUPIED" | "USERNAME_INVALID" | "CHANNEL_INVALID" | "CHANNEL_PRIVATE"
    )
}

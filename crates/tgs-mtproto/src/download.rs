//! Download requests, one shape per way of addressing a file.

use grammers_tl_types as tl;
use tgs_core::media::{FileLocation, NativeMedia};

use crate::convert::input_location;

/// Chunk size for `upload.getFile`; must divide 1 MiB.
pub(crate) const CHUNK: i32 = 512 * 1024;

/// The media object exactly as a story listing returned it.
#[derive(Clone, Debug)]
pub(crate) enum RawMedia {
    Photo(tl::types::MessageMediaPhoto),
    Document(tl::types::MessageMediaDocument),
}

#[derive(Clone, Debug)]
pub(crate) enum DownloadRequest {
    /// Handed to the client's own download iterator, which picks the DC,
    /// location and chunking from the media object.
    Media(RawMedia),
    /// Explicit `upload.getFile` against the file's home DC.
    Location {
        dc_id: i32,
        location: tl::enums::InputFileLocation,
    },
}

impl DownloadRequest {
    /// `None` when the listing carried no downloadable media object.
    pub(crate) fn native(native: &NativeMedia) -> Option<Self> {
        let raw = match native.downcast_ref::<tl::enums::MessageMedia>()? {
            tl::enums::MessageMedia::Photo(m) => RawMedia::Photo(m.clone()),
            tl::enums::MessageMedia::Document(m) => RawMedia::Document(m.clone()),
            _ => return None,
        };
        Some(Self::Media(raw))
    }

    pub(crate) fn location(loc: &FileLocation) -> Self {
        Self::Location {
            dc_id: loc.file.dc_id,
            location: input_location(loc),
        }
    }
}

pub(crate) fn get_file(location: &tl::enums::InputFileLocation, offset: i64) -> tl::functions::upload::GetFile {
    tl::functions::upload::GetFile {
        precise: false,
        cdn_supported: false,
        location: location.clone(),
        offset,
        limit: CHUNK,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::convert::media_ref;

    fn photo_media() -> tl::enums::MessageMedia {
        tl::enums::MessageMedia::Photo(tl::types::MessageMediaPhoto {
            spoiler: false,
            photo: Some(tl::enums::Photo::Photo(tl::types::Photo {
                has_stickers: false,
                id: 11,
                access_hash: 22,
                file_reference: vec![1, 2, 3],
                date: 1_700_000_000,
                sizes: vec![tl::enums::PhotoSize::Size(tl::types::PhotoSize {
                    r#type: "y".into(),
                    w: 1080,
                    h: 1920,
                    size: 250_000,
                })],
                video_sizes: None,
                dc_id: 4,
            })),
            ttl_seconds: None,
        })
    }

    #[test]
    fn native_and_location_requests_differ() {
        let raw = photo_media();
        let native = NativeMedia::new(raw.clone());
        let media = media_ref(&raw).unwrap();

        let Some(DownloadRequest::Media(RawMedia::Photo(sent))) = DownloadRequest::native(&native)
        else {
            panic!("expected the listing's photo object");
        };
        assert!(matches!(sent.photo, Some(tl::enums::Photo::Photo(ref p)) if p.id == 11));

        let DownloadRequest::Location { dc_id, location } =
            DownloadRequest::location(&FileLocation::from(&media))
        else {
            panic!("expected an explicit location");
        };
        assert_eq!(dc_id, 4);
        let tl::enums::InputFileLocation::InputPhotoFileLocation(loc) = location else {
            panic!("expected a photo location");
        };
        assert_eq!((loc.id, loc.access_hash, loc.thumb_size.as_str()), (11, 22, "y"));
    }

    #[test]
    fn foreign_native_objects_are_rejected() {
        assert!(DownloadRequest::native(&NativeMedia::new("not a tl object")).is_none());
        let empty = NativeMedia::new(tl::enums::MessageMedia::Empty);
        assert!(DownloadRequest::native(&empty).is_none());
    }

    #[test]
    fn get_file_uses_fixed_chunks() {
        let loc = tl::enums::InputFileLocation::InputDocumentFileLocation(
            tl::types::InputDocumentFileLocation {
                id: 1,
                access_hash: 2,
                file_reference: vec![],
                thumb_size: String::new(),
            },
        );
        let req = get_file(&loc, i64::from(CHUNK));
        assert_eq!(req.limit, CHUNK);
        assert_eq!(req.offset, 524_288);
        assert_eq!(1024 * 1024 % req.limit, 0);
    }
}

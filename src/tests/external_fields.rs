mod timestamp_tests {
    use crate::archive_common::ArchiveDescriptor;
    use crate::extra_field::{extra_fields, ExtraField, ExtraFieldExtendedTimestamp, ExtraFields};

    const TEST_DATA: Option<i32> = Some(1582248020);

    #[test]
    fn test_flags() {
        let extrafield = ExtraFieldExtendedTimestamp::new(TEST_DATA, None, None);
        assert_eq!(
            extrafield.flags(),
            ExtraFieldExtendedTimestamp::MODIFY_TIME_BIT
        );

        let extrafield = ExtraFieldExtendedTimestamp::new(TEST_DATA, TEST_DATA, TEST_DATA);
        assert_eq!(
            extrafield.flags(),
            ExtraFieldExtendedTimestamp::MODIFY_TIME_BIT
                | ExtraFieldExtendedTimestamp::CREATE_TIME_BIT
                | ExtraFieldExtendedTimestamp::ACCESS_TIME_BIT
        );

        let extrafield = ExtraFieldExtendedTimestamp::new(None, TEST_DATA, TEST_DATA);
        assert_eq!(
            extrafield.flags(),
            ExtraFieldExtendedTimestamp::ACCESS_TIME_BIT
                | ExtraFieldExtendedTimestamp::CREATE_TIME_BIT
        );
    }

    #[test]
    fn test_write() {
        let extrafield = ExtraFieldExtendedTimestamp::new(None, None, None);
        let mut archive_descriptor = ArchiveDescriptor::new(100);

        extrafield.central_header_write_data(&mut archive_descriptor);
        assert!(archive_descriptor.is_empty());
        extrafield.local_header_write_data(&mut archive_descriptor);
        assert!(archive_descriptor.is_empty());

        let extrafield = ExtraFieldExtendedTimestamp::new(TEST_DATA, TEST_DATA, TEST_DATA);

        extrafield.central_header_write_data(&mut archive_descriptor);
        assert_eq!(archive_descriptor.len(), 4 + 5);

        archive_descriptor.clear();
        extrafield.local_header_write_data(&mut archive_descriptor);
        assert_eq!(archive_descriptor.len(), 4 + 13);
        assert_eq!(
            archive_descriptor.len(),
            extrafield.local_header_extra_field_size() as usize
        );
    }

    #[test]
    fn test_central_copy_keeps_modification_time() {
        let extrafield = ExtraFieldExtendedTimestamp::new(TEST_DATA, TEST_DATA, None);
        let mut archive_descriptor = ArchiveDescriptor::new(100);
        extrafield.central_header_write_data(&mut archive_descriptor);

        let raw = extra_fields(archive_descriptor.buffer()).next().unwrap();
        match raw.decode(Default::default()) {
            ExtraField::ExtendedTimestamp(parsed) => {
                assert_eq!(parsed.modify_time(), TEST_DATA);
                assert_eq!(parsed.access_time(), None);
                assert_eq!(
                    parsed.modified_time_utc().map(|time| time.timestamp()),
                    Some(1582248020)
                );
            }
            other => panic!("unexpected {:?}", other),
        }
    }
}

mod iterator_tests {
    use crate::archive_common::ArchiveDescriptor;
    use crate::constants::{S_IFLNK, S_IFREG};
    use crate::extra_field::{
        extra_fields, ExtraField, ExtraFieldAsiUnix, ExtraFieldZIP64ExtendedInformation,
        ExtraFields, Zip64Fields,
    };

    #[test]
    fn test_unknown_fields_are_skipped() {
        let mut archive_descriptor = ArchiveDescriptor::new(100);
        archive_descriptor.write_u16(0xCAFE);
        archive_descriptor.write_u16(3);
        archive_descriptor.write_bytes(&[1, 2, 3]);
        ExtraFieldAsiUnix::new(S_IFREG | 0o755).local_header_write_data(&mut archive_descriptor);

        let decoded: Vec<ExtraField> = extra_fields(archive_descriptor.buffer())
            .map(|raw| raw.decode(Zip64Fields::default()))
            .collect();

        assert_eq!(decoded.len(), 2);
        assert!(matches!(&decoded[0], ExtraField::Unknown(unknown) if unknown.header_id == 0xCAFE));
        assert!(
            matches!(&decoded[1], ExtraField::AsiUnix(unix) if unix.mode == S_IFREG | 0o755)
        );
    }

    #[test]
    fn test_truncated_field_ends_iteration() {
        let mut archive_descriptor = ArchiveDescriptor::new(100);
        ExtraFieldAsiUnix::new(S_IFLNK | 0o777).local_header_write_data(&mut archive_descriptor);
        archive_descriptor.write_u16(0x0001);
        archive_descriptor.write_u16(16);
        archive_descriptor.write_u32(0);

        let mut iter = extra_fields(archive_descriptor.buffer());
        let first = iter.next().unwrap();
        assert_eq!(first.header_id, ExtraFieldAsiUnix::HEADER_ID);
        assert!(iter.next().is_none());
        assert!(iter.next().is_none());
    }

    #[test]
    fn test_asi_unix_symlink_and_crc() {
        let mut unix = ExtraFieldAsiUnix::new(S_IFLNK | 0o777);
        unix.link = b"source.txt".to_vec();
        assert!(unix.is_symlink());

        let mut archive_descriptor = ArchiveDescriptor::new(100);
        unix.local_header_write_data(&mut archive_descriptor);
        let mut bytes = archive_descriptor.finish();

        let raw = extra_fields(&bytes).next().unwrap();
        assert_eq!(raw.decode(Zip64Fields::default()), ExtraField::AsiUnix(unix));

        // corrupt the mode, the CRC no longer matches
        bytes[8] ^= 0xFF;
        let raw = extra_fields(&bytes).next().unwrap();
        assert!(matches!(
            raw.decode(Zip64Fields::default()),
            ExtraField::Unknown(_)
        ));
    }

    #[test]
    fn test_zip64_only_saturated_values() {
        let mut archive_descriptor = ArchiveDescriptor::new(100);
        archive_descriptor.write_u16(ExtraFieldZIP64ExtendedInformation::HEADER_ID);
        archive_descriptor.write_u16(16);
        archive_descriptor.write_u64(5_000_000_000);
        archive_descriptor.write_u64(6_000_000_000);

        let wanted = Zip64Fields {
            compressed_size: true,
            offset: true,
            ..Default::default()
        };
        let raw = extra_fields(archive_descriptor.buffer()).next().unwrap();

        match raw.decode(wanted) {
            ExtraField::Zip64(zip64) => {
                assert_eq!(zip64.uncompressed_size, None);
                assert_eq!(zip64.compressed_size, Some(5_000_000_000));
                assert_eq!(zip64.offset, Some(6_000_000_000));
                assert_eq!(zip64.disk_number, None);
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_zip64_local_header_size() {
        let zip64 = ExtraFieldZIP64ExtendedInformation::for_local_header(1, 2);
        assert_eq!(
            zip64.local_header_extra_field_size(),
            ExtraFieldZIP64ExtendedInformation::LOCAL_HEADER_SIZE
        );
    }
}

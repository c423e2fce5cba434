use crate::builder::{FilterBuilder, FilterError, MAX_EXT_ID, MAX_STD_ID};
use crate::fdcan::{FdcanFilter, FdcanG0, FdcanH7};
use bytes::Buf;

/// Decoded FDCAN wire image
struct Image {
    dev: u8,
    std_filter_nbr: u8,
    ext_filter_nbr: u8,
    std_filter: Vec<u32>,
    ext_filter: Vec<[u32; 2]>,
}

fn decode(image: &[u8], max_std: usize, max_ext: usize) -> Image {
    assert_eq!(4 + 4 * max_std + 8 * max_ext, image.len());
    assert_eq!(0, image[3]);

    let mut buf = &image[4..];
    let std_filter = (0..max_std).map(|_| buf.get_u32_le()).collect();
    let ext_filter = (0..max_ext).map(|_| [buf.get_u32_le(), buf.get_u32_le()]).collect();

    Image {
        dev: image[0],
        std_filter_nbr: image[1],
        ext_filter_nbr: image[2],
        std_filter,
        ext_filter,
    }
}

fn std_range(id1: u32, id2: u32) -> u32 {
    (1 << 27) | (id1 << 16) | id2
}

fn std_dual(id1: u32, id2: u32) -> u32 {
    (1 << 30) | (1 << 27) | (id1 << 16) | id2
}

#[test]
fn test_standard_range_element() {
    let mut filter = FdcanG0::new();
    filter.begin();
    filter.parse("0x100-0x200").unwrap();
    filter.end().unwrap();

    let image = decode(&filter.image(), 28, 8);
    assert_eq!(3, image.dev);
    assert_eq!(1, image.std_filter_nbr);
    assert_eq!(0, image.ext_filter_nbr);
    assert_eq!(std_range(0x100, 0x200), image.std_filter[0]);
}

#[test]
fn test_two_standard_ids_share_a_dual_element() {
    let mut filter = FdcanG0::new();
    filter.begin();
    filter.parse("0x100 0x200").unwrap();
    filter.end().unwrap();

    let image = decode(&filter.image(), 28, 8);
    assert_eq!(1, image.std_filter_nbr);
    assert_eq!(std_dual(0x100, 0x200), image.std_filter[0]);
}

#[test]
fn test_lone_standard_id_is_flushed_as_dual() {
    let mut filter = FdcanG0::new();
    filter.begin();
    filter.add_std_id(0x123).unwrap();
    filter.end().unwrap();

    let image = decode(&filter.image(), 28, 8);
    assert_eq!(1, image.std_filter_nbr);
    assert_eq!(std_dual(0x123, 0x123), image.std_filter[0]);
}

#[test]
fn test_ranges_do_not_disturb_pending_ids() {
    let mut filter = FdcanG0::new();
    filter.begin();
    filter.parse("0x100 0x180-0x1FF 0x200").unwrap();
    filter.end().unwrap();

    let image = decode(&filter.image(), 28, 8);
    assert_eq!(2, image.std_filter_nbr);
    assert_eq!(std_range(0x180, 0x1FF), image.std_filter[0]);
    assert_eq!(std_dual(0x100, 0x200), image.std_filter[1]);
}

#[test]
fn test_extended_dual_element() {
    let mut filter = FdcanG0::new();
    filter.begin();
    filter.add_ext_id(0x0001_0000).unwrap();
    filter.add_ext_id(0x1F00_0000).unwrap();
    filter.end().unwrap();

    let image = decode(&filter.image(), 28, 8);
    assert_eq!(1, image.ext_filter_nbr);
    assert_eq!((1 << 29) | 0x0001_0000, image.ext_filter[0][0]);
    assert_eq!((1 << 30) | 0x1F00_0000, image.ext_filter[0][1]);
}

#[test]
fn test_extended_range_element() {
    let mut filter = FdcanG0::new();
    filter.begin();
    filter.add_ext_range(0x1F00_0000, 0x0001_0000).unwrap();
    filter.end().unwrap();

    let image = decode(&filter.image(), 28, 8);
    assert_eq!(1, image.ext_filter_nbr);
    assert_eq!((1 << 29) | 0x0001_0000, image.ext_filter[0][0]);
    assert_eq!(0x1F00_0000, image.ext_filter[0][1]);
}

#[test]
fn test_allow_all_on_h7() {
    let mut filter = FdcanH7::new();
    filter.begin();
    filter.allow_all().unwrap();
    filter.end().unwrap();

    let raw = filter.image();
    assert_eq!(FdcanH7::IMAGE_SIZE, raw.len());
    assert_eq!(1028, raw.len());

    let image = decode(&raw, 128, 64);
    assert_eq!(4, image.dev);
    assert_eq!(1, image.std_filter_nbr);
    assert_eq!(1, image.ext_filter_nbr);
    assert_eq!(std_range(0, MAX_STD_ID), image.std_filter[0]);
    assert_eq!(1 << 29, image.ext_filter[0][0]);
    assert_eq!(MAX_EXT_ID, image.ext_filter[0][1]);
}

#[test]
fn test_range_normalization() {
    let mut forward = FdcanG0::new();
    forward.begin();
    forward.add_std_range(0x100, 0x200).unwrap();
    forward.end().unwrap();

    let mut reversed = FdcanG0::new();
    reversed.begin();
    reversed.add_std_range(0x200, 0x100).unwrap();
    reversed.end().unwrap();

    assert_eq!(forward.image(), reversed.image());
}

#[test]
fn test_rejects_out_of_range_parameters() {
    let mut filter = FdcanG0::new();
    filter.begin();

    assert_eq!(Err(FilterError::Param), filter.add_std_id(0x800));
    assert_eq!(Err(FilterError::Param), filter.add_std_range(0, 0x800));
    assert_eq!(Err(FilterError::Param), filter.add_ext_id(0x2000_0000));
    assert_eq!(Err(FilterError::Param), filter.add_ext_range(0x2000_0000, 0));

    filter.end().unwrap();
    let image = decode(&filter.image(), 28, 8);
    assert_eq!(0, image.std_filter_nbr);
    assert_eq!(0, image.ext_filter_nbr);
}

#[test]
fn test_standard_capacity() {
    let mut filter = FdcanG0::new();
    filter.begin();

    for i in 0..28 {
        filter.add_std_range(i, i + 1).unwrap();
    }
    assert_eq!(Err(FilterError::Full), filter.add_std_range(0x100, 0x200));

    let image = decode(&filter.image(), 28, 8);
    assert_eq!(28, image.std_filter_nbr);
}

#[test]
fn test_extended_capacity() {
    let mut filter = FdcanG0::new();
    filter.begin();

    for i in 0..8 {
        filter.add_ext_range(i * 0x1000, i * 0x1000 + 0xFF).unwrap();
    }
    assert_eq!(Err(FilterError::Full), filter.add_ext_range(0x9000, 0x90FF));

    let image = decode(&filter.image(), 28, 8);
    assert_eq!(8, image.ext_filter_nbr);
}

#[test]
fn test_capacity_overflow_in_end() {
    let mut filter = FdcanG0::new();
    filter.begin();

    for i in 0..28 {
        filter.add_std_range(i, i).unwrap();
    }
    filter.add_std_id(0x100).unwrap();

    assert_eq!(Err(FilterError::Full), filter.end());
    assert_eq!(28, decode(&filter.image(), 28, 8).std_filter_nbr);
}

#[test]
fn test_unused_elements_stay_zero() {
    let mut filter = FdcanG0::new();
    filter.begin();
    filter.parse("0x100-0x200 0x1F000000-0x1F0000FF").unwrap();
    filter.end().unwrap();

    let image = decode(&filter.image(), 28, 8);
    for element in &image.std_filter[1..] {
        assert_eq!(0, *element);
    }
    for element in &image.ext_filter[1..] {
        assert_eq!([0, 0], *element);
    }
}

#[test]
fn test_allow_all_equals_spelled_out_ranges() {
    let mut filter = FdcanG0::new();
    filter.begin();
    filter.allow_all().unwrap();
    filter.end().unwrap();

    let mut spelled = FdcanG0::new();
    spelled.begin();
    spelled.parse("0-0x7FF 0-0x1FFFFFFF").unwrap();
    spelled.end().unwrap();

    assert_eq!(filter.image(), spelled.image());
}

#[test]
fn test_log_output_does_not_panic() {
    let mut filter = FdcanG0::new();
    filter.begin();
    filter.parse("0x100 0x200 0x300-0x3FF 0x10000 0x1F000000-0x1F0000FF").unwrap();
    filter.end().unwrap();

    filter.log_registers();
    filter.log_filters();
    filter.log_usage();
}

#[test]
fn test_g0_image_size() {
    let filter: FdcanG0 = FdcanFilter::new();
    assert_eq!(180, FdcanG0::IMAGE_SIZE);
    assert_eq!(180, filter.image().len());
}

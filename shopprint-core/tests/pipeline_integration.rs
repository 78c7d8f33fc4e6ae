use std::fs;
use std::path::Path;

use shopprint_core::aggregate::LabelPolicy;
use shopprint_core::config::{
    ApiConfig, DocumentConfig, PathsConfig, PipelineConfig, VariantConfig,
};
use shopprint_core::contract::{
    FetchError, MockOrderSource, OrderPage, RawLineItem, RawOrder,
};
use shopprint_core::document::DocumentError;
use shopprint_core::pipeline::{self, PipelineError};
use shopprint_core::variant::CanonicalVariant;
use tempfile::TempDir;

fn config(root: &Path) -> PipelineConfig {
    PipelineConfig {
        api: ApiConfig::for_store("test-shop", "2024-04", "token"),
        paths: PathsConfig {
            asset_root: root.join("assets"),
            staging_root: root.join("files"),
            output_dir: root.join("prints"),
        },
        variants: VariantConfig::default(),
        label_policy: LabelPolicy::default(),
        document: DocumentConfig::default(),
    }
}

fn write_jpeg(path: &Path) {
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    image::RgbImage::from_pixel(30, 40, image::Rgb([10, 120, 200]))
        .save(path)
        .unwrap();
}

fn page_count(path: &Path) -> usize {
    lopdf::Document::load(path).unwrap().get_pages().len()
}

/// Names drawn with `Do` on each page that are not image XObjects of that page.
fn unresolved_images(path: &Path) -> Vec<(u32, String)> {
    let doc = lopdf::Document::load(path).unwrap();
    let image_in = |xobjects: &lopdf::Dictionary, name: &[u8]| {
        xobjects
            .get(name)
            .and_then(|entry| doc.dereference(entry))
            .and_then(|(_, object)| object.as_stream())
            .and_then(|stream| stream.dict.get(b"Subtype"))
            .and_then(|subtype| subtype.as_name())
            .is_ok_and(|subtype| subtype == b"Image")
    };

    let mut unresolved = Vec::new();
    for (number, page_id) in doc.get_pages() {
        let page = doc.get_dictionary(page_id).unwrap();
        let (_, resources) = doc.dereference(page.get(b"Resources").unwrap()).unwrap();
        let (_, xobjects) = doc
            .dereference(resources.as_dict().unwrap().get(b"XObject").unwrap())
            .unwrap();
        let xobjects = xobjects.as_dict().unwrap();

        let content = doc.get_and_decode_page_content(page_id).unwrap();
        for op in content.operations.iter().filter(|op| op.operator == "Do") {
            let name = op.operands[0].as_name().unwrap();
            if !image_in(xobjects, name) {
                unresolved.push((number, String::from_utf8_lossy(name).into_owned()));
            }
        }
    }
    unresolved
}

fn sample_orders() -> Vec<RawOrder> {
    vec![
        RawOrder {
            id: Some(1),
            name: Some("#1001".into()),
            line_items: vec![
                RawLineItem::new("SKU1", "Small", 2),
                RawLineItem::new("FEE", "$1.98", 1),
            ],
        },
        RawOrder {
            id: Some(2),
            name: Some("#1002".into()),
            line_items: vec![
                RawLineItem::new("SKU1", "Medium", 3),
                RawLineItem::new("SKU2", "5x7", 1),
                RawLineItem::new("SKU3", "Poster", 1),
            ],
        },
    ]
}

fn source_with(orders: Vec<RawOrder>) -> MockOrderSource {
    let total = orders.len() as u64;
    let mut source = MockOrderSource::new();
    source.expect_count_open_orders().returning(move || Ok(total));
    source.expect_fetch_page().returning(move |_| {
        Ok(OrderPage {
            orders: orders.clone(),
            next_cursor: None,
        })
    });
    source
}

#[tokio::test]
async fn test_print_run_builds_document_and_reports_gaps() {
    let dir = TempDir::new().unwrap();
    let cfg = config(dir.path());
    write_jpeg(&dir.path().join("assets/8x10/SKU1.jpg"));

    let report = pipeline::print_open_orders(&source_with(sample_orders()), &cfg)
        .await
        .unwrap();

    let assembly = report.assembly.expect("document written");
    assert!(assembly.document.starts_with(dir.path().join("prints")));
    assert_eq!(page_count(&assembly.document), 5);
    assert!(unresolved_images(&assembly.document).is_empty());
    assert_eq!(assembly.missing, vec!["SKU2".to_string()]);
    assert_eq!(report.unmapped.len(), 1);
    assert_eq!(report.unmapped[0].identifier, "SKU3");
    assert_eq!(report.skipped, 1);
    assert_eq!(report.fetch.orders_fetched, 2);
    assert!(report.fetch.warning.is_none());
}

#[tokio::test]
async fn test_print_run_with_no_open_orders_writes_nothing() {
    let dir = TempDir::new().unwrap();
    let cfg = config(dir.path());
    let mut source = MockOrderSource::new();
    source.expect_count_open_orders().returning(|| Ok(0));
    source.expect_fetch_page().never();

    let report = pipeline::print_open_orders(&source, &cfg).await.unwrap();

    assert!(report.assembly.is_none());
    assert!(!dir.path().join("prints").exists());
}

#[tokio::test]
async fn test_print_run_without_any_asset_is_an_error() {
    let dir = TempDir::new().unwrap();
    let cfg = config(dir.path());

    let err = pipeline::print_open_orders(&source_with(sample_orders()), &cfg)
        .await
        .unwrap_err();

    assert!(matches!(err, PipelineError::Document(DocumentError::NoAssets)), "got {err:?}");
}

#[tokio::test]
async fn test_print_run_fails_when_nothing_could_be_fetched() {
    let dir = TempDir::new().unwrap();
    let cfg = config(dir.path());
    let mut source = MockOrderSource::new();
    source.expect_count_open_orders().returning(|| {
        Err(FetchError::Status {
            url: "https://test-shop.myshopify.com/admin/api/2024-04/orders/count.json".into(),
            status: 401,
        })
    });

    let err = pipeline::print_open_orders(&source, &cfg).await.unwrap_err();
    assert!(matches!(err, PipelineError::Network(FetchError::Status { status: 401, .. })));
}

#[tokio::test]
async fn test_reject_policy_aborts_before_any_output() {
    let dir = TempDir::new().unwrap();
    let mut cfg = config(dir.path());
    cfg.label_policy = LabelPolicy::Reject;
    write_jpeg(&dir.path().join("assets/8x10/SKU1.jpg"));

    let err = pipeline::print_open_orders(&source_with(sample_orders()), &cfg)
        .await
        .unwrap_err();

    assert!(matches!(err, PipelineError::Aggregate(_)));
    assert!(!dir.path().join("prints").exists());
}

#[tokio::test]
async fn test_organize_run_stages_one_file_per_print() {
    let dir = TempDir::new().unwrap();
    let cfg = config(dir.path());
    write_jpeg(&dir.path().join("assets/8x10/SKU1.jpg"));
    let staging = dir.path().join("override");

    let summary =
        pipeline::organize_open_orders(&source_with(sample_orders()), &cfg, Some(&staging))
            .await
            .unwrap();

    assert_eq!(summary.staging_root, staging);
    assert_eq!(summary.copied.len(), 5);
    assert!(summary.copy_failures.is_empty());
    assert_eq!(summary.missing, vec!["SKU2".to_string()]);
    assert!(staging.join("8x10/SKU1_5.jpg").is_file());
    assert!(!dir.path().join("files").exists());
}

#[test]
fn test_add_item_appends_copies_to_latest_document() {
    let dir = TempDir::new().unwrap();
    let cfg = config(dir.path());
    write_jpeg(&dir.path().join("assets/8x10/SKU1.jpg"));
    write_jpeg(&dir.path().join("assets/5x7/SKU2.jpg"));

    let assembler =
        shopprint_core::document::DocumentAssembler::new(&cfg.paths.output_dir, &cfg.document);
    assembler
        .create_document_at(&[(dir.path().join("assets/5x7/SKU2.jpg"), 1)], 1_700_000_000)
        .unwrap();

    let result = pipeline::add_item(
        &cfg.paths,
        &cfg.document,
        "SKU1",
        CanonicalVariant::EightByTen,
        2,
    )
    .unwrap();

    assert_eq!(
        result.document,
        dir.path().join("prints/ph_1700000000_updated.pdf")
    );
    assert_eq!(page_count(&result.document), 3);
    assert!(
        unresolved_images(&result.document).is_empty(),
        "{:?}",
        unresolved_images(&result.document)
    );
}

#[test]
fn test_add_item_without_asset_fails() {
    let dir = TempDir::new().unwrap();
    let cfg = config(dir.path());

    let err = pipeline::add_item(
        &cfg.paths,
        &cfg.document,
        "SKU404",
        CanonicalVariant::FiveBySeven,
        1,
    )
    .unwrap_err();
    assert!(matches!(
        err,
        PipelineError::MissingAsset {
            variant: CanonicalVariant::FiveBySeven,
            ..
        }
    ));
}

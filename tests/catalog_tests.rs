mod common;

use common::Harness;
use opensase_storefront::services::ProductQuery;

#[tokio::test]
async fn test_page_far_beyond_catalog_is_empty() {
    let h = Harness::new();
    h.product(1000, 5).await;

    let page = h
        .state
        .catalog()
        .list_products(ProductQuery { page: Some(u32::MAX), per_page: Some(100), ..Default::default() }, false)
        .await
        .unwrap();

    assert!(page.items.is_empty());
    assert_eq!(page.total, 1);
    assert_eq!(page.page, u32::MAX);
}

#[tokio::test]
async fn test_first_page_lists_products() {
    let h = Harness::new();
    h.product(1000, 5).await;
    h.product(2000, 5).await;

    let page = h.state.catalog().list_products(ProductQuery::default(), false).await.unwrap();
    assert_eq!(page.items.len(), 2);
    assert_eq!(page.per_page, 20);
}

//! End-to-end scenario 6 from spec.md §8: per-client size aggregation.

use sioba::{interface_from_uri, Interface, InterfaceContext};

#[tokio::test]
async fn aggregate_size_is_the_minimum_across_clients() {
    let iface = interface_from_uri("echo://", None, InterfaceContext::default()).unwrap();
    iface.start().await.unwrap();

    iface.update_terminal_metadata("a", Some(30), Some(100)).await;
    iface.update_terminal_metadata("b", Some(20), Some(120)).await;

    let ctx = iface.context();
    assert_eq!(ctx.rows, Some(20));
    assert_eq!(ctx.cols, Some(100));
}

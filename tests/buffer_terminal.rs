//! End-to-end scenario 3 from spec.md §8: terminal buffer cursor tracking
//! across a resize.

use sioba::buffer_for_context;
use sioba::InterfaceContext;

#[test]
fn cursor_tracks_writes_and_resize() {
    let ctx = InterfaceContext { rows: Some(24), cols: Some(80), ..InterfaceContext::default() };
    let mut buf = buffer_for_context(&ctx).unwrap();

    buf.feed(b"foo");
    assert_eq!(buf.cursor_position(), (0, 3));

    buf.reshape(10, 10);
    buf.feed(b"abcdefghijklmnopqrstuvwxyz");
    assert_eq!(buf.cursor_position(), (2, 6));
}

//! `echo://` — loops `receive_from_frontend` straight back to `send_to_frontend`.

use std::sync::Arc;

use async_trait::async_trait;

use crate::buffer::buffer_for_context;
use crate::context::InterfaceContext;
use crate::error::Result;

use super::{finish_construction, Interface, InterfaceCore};

pub struct EchoInterface {
    core: InterfaceCore,
}

impl EchoInterface {
    pub fn new(mut ctx: InterfaceContext) -> Result<Self> {
        ctx.convert_eol.get_or_insert(true);
        let buffer = buffer_for_context(&ctx)?;
        Ok(Self { core: InterfaceCore::new(ctx, buffer) })
    }
}

#[async_trait]
impl Interface for EchoInterface {
    fn core(&self) -> &InterfaceCore {
        &self.core
    }

    async fn start_interface(&self) -> Result<()> {
        Ok(())
    }

    async fn shutdown_interface(&self) -> Result<()> {
        Ok(())
    }

    async fn write_to_transport(&self, data: &[u8]) -> Result<()> {
        self.send_to_frontend(bytes::Bytes::copy_from_slice(data)).await
    }
}

pub fn factory(ctx: InterfaceContext) -> Result<Arc<dyn Interface>> {
    Ok(finish_construction(EchoInterface::new(ctx)?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use std::sync::Mutex;

    #[tokio::test]
    async fn receive_triggers_one_matching_send_callback() {
        let iface = factory(InterfaceContext::default()).unwrap();
        iface.start().await.unwrap();

        let seen: Arc<Mutex<Vec<Bytes>>> = Arc::new(Mutex::new(Vec::new()));
        let seen2 = seen.clone();
        iface.on_send_to_frontend(Arc::new(move |data| {
            let seen = seen2.clone();
            Box::pin(async move {
                seen.lock().unwrap().push(data);
            })
        }));

        iface.receive_from_frontend(Bytes::from_static(b"Hello, World!")).await.unwrap();

        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0], Bytes::from_static(b"Hello, World!"));
    }
}

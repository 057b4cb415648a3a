//! Async boundary between the consensus engine and the pipeline.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::warn;

use crate::error::Result;
use crate::messages::{
    Request, RequestBeginBlock, RequestDeliverTx, RequestEndBlock, RequestInitChain, Response,
    ResponseBeginBlock, ResponseCommit, ResponseDeliverTx, ResponseEndBlock, ResponseInfo,
    ResponseInitChain,
};
use crate::pipeline::BlockExecutionPipeline;

/// Lifecycle calls made by the consensus engine. Calls are strictly
/// sequential; implementations serialize them.
#[async_trait]
pub trait Application: Send + Sync {
    async fn info(&self) -> ResponseInfo;
    async fn init_chain(&self, request: RequestInitChain) -> Result<ResponseInitChain>;
    async fn begin_block(&self, request: RequestBeginBlock) -> Result<ResponseBeginBlock>;
    async fn deliver_tx(&self, request: RequestDeliverTx) -> Result<ResponseDeliverTx>;
    async fn end_block(&self, request: RequestEndBlock) -> Result<ResponseEndBlock>;
    async fn commit(&self) -> Result<ResponseCommit>;
}

/// Shared handle to a pipeline.
#[derive(Clone)]
pub struct AbciApplication {
    pipeline: Arc<Mutex<BlockExecutionPipeline>>,
}

impl AbciApplication {
    pub fn new(pipeline: BlockExecutionPipeline) -> Self {
        Self {
            pipeline: Arc::new(Mutex::new(pipeline)),
        }
    }

    pub fn pipeline(&self) -> Arc<Mutex<BlockExecutionPipeline>> {
        self.pipeline.clone()
    }
}

#[async_trait]
impl Application for AbciApplication {
    async fn info(&self) -> ResponseInfo {
        self.pipeline.lock().await.info()
    }

    async fn init_chain(&self, request: RequestInitChain) -> Result<ResponseInitChain> {
        self.pipeline.lock().await.init_chain(request)
    }

    async fn begin_block(&self, request: RequestBeginBlock) -> Result<ResponseBeginBlock> {
        self.pipeline.lock().await.begin_block(request)
    }

    async fn deliver_tx(&self, request: RequestDeliverTx) -> Result<ResponseDeliverTx> {
        self.pipeline.lock().await.deliver_tx(request)
    }

    async fn end_block(&self, request: RequestEndBlock) -> Result<ResponseEndBlock> {
        self.pipeline.lock().await.end_block(request)
    }

    async fn commit(&self) -> Result<ResponseCommit> {
        self.pipeline.lock().await.commit()
    }
}

/// Routes one request. Errors become [`Response::Exception`].
pub async fn dispatch<A: Application + ?Sized>(app: &A, request: Request) -> Response {
    let method = request.method();
    let result = match request {
        Request::Info => Ok(Response::Info(app.info().await)),
        Request::InitChain(request) => app.init_chain(request).await.map(Response::InitChain),
        Request::BeginBlock(request) => app.begin_block(request).await.map(Response::BeginBlock),
        Request::DeliverTx(request) => app.deliver_tx(request).await.map(Response::DeliverTx),
        Request::EndBlock(request) => app.end_block(request).await.map(Response::EndBlock),
        Request::Commit => app.commit().await.map(Response::Commit),
    };

    result.unwrap_or_else(|err| {
        warn!(method, error = %err, "lifecycle call failed");
        Response::Exception {
            error: err.to_string(),
        }
    })
}

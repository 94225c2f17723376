//! gRPC service implementation of `ova.checklist.v1.ChecklistStorage`.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tonic::{Request, Response, Status};
use tracing::{debug, info_span, Instrument};

use checklist_server::Saver;
use checklist_storage::ChecklistRepository;

use crate::observability::{Handler, HandlerMetrics};
use crate::proto::ova::checklist::v1::{
    checklist_storage_server::ChecklistStorage, CreateChecklistRequest, CreateChecklistResponse,
    DescribeChecklistRequest, DescribeChecklistResponse, ListChecklistsRequest,
    ListChecklistsResponse, MultiCreateChecklistRequest, MultiCreateChecklistResponse,
    RemoveChecklistRequest, RemoveChecklistResponse, UpdateChecklistRequest,
    UpdateChecklistResponse,
};

use super::conversion::{
    checklist_from_proto, checklist_to_proto, new_checklist_from_proto, storage_error_to_status,
    user_checklists_to_proto,
};

/// gRPC service for checklists.
///
/// Single-checklist writes and reads go straight to the repository.
/// `MultiCreateChecklist` only enqueues into the [`Saver`]; the checklists
/// are persisted by its next flush.
pub struct ChecklistGrpcService<R: ChecklistRepository> {
    repository: Arc<R>,
    saver: Arc<Saver>,
    metrics: Arc<HandlerMetrics>,
    /// Parent of every request's token; cancelled at shutdown.
    shutdown: CancellationToken,
}

impl<R: ChecklistRepository> ChecklistGrpcService<R> {
    pub fn new(repository: Arc<R>, saver: Arc<Saver>) -> Self {
        Self::with_parts(
            repository,
            saver,
            Arc::new(HandlerMetrics::new()),
            CancellationToken::new(),
        )
    }

    pub fn with_parts(
        repository: Arc<R>,
        saver: Arc<Saver>,
        metrics: Arc<HandlerMetrics>,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            repository,
            saver,
            metrics,
            shutdown,
        }
    }

    pub fn metrics(&self) -> &Arc<HandlerMetrics> {
        &self.metrics
    }

    /// Cancelling this token aborts every in-flight repository call.
    pub fn shutdown_token(&self) -> &CancellationToken {
        &self.shutdown
    }

    fn request_token(&self) -> CancellationToken {
        self.shutdown.child_token()
    }

    async fn create_checklist_impl(
        &self,
        req: CreateChecklistRequest,
    ) -> Result<CreateChecklistResponse, Status> {
        let checklist = req
            .checklist
            .ok_or_else(|| Status::invalid_argument("checklist parameter is absent"))?;
        let checklist = new_checklist_from_proto(checklist);
        debug!(
            checklist_id = %checklist.id,
            checklist = %checklist,
            empty = checklist.is_empty(),
            complete = checklist.is_complete(),
            "Creating checklist"
        );

        self.repository
            .add(&self.request_token(), std::slice::from_ref(&checklist))
            .await
            .map_err(|e| storage_error_to_status(e, "unable to save checklist"))?;

        Ok(CreateChecklistResponse {
            checklist_id: checklist.id,
        })
    }

    async fn multi_create_checklist_impl(
        &self,
        req: MultiCreateChecklistRequest,
    ) -> Result<MultiCreateChecklistResponse, Status> {
        if req.checklists.is_empty() {
            return Err(Status::invalid_argument("the list of checklists is empty"));
        }
        let checklists: Vec<_> = req
            .checklists
            .into_iter()
            .map(new_checklist_from_proto)
            .collect();

        let total_saved = self.saver.try_save_batch(checklists).await;
        if total_saved == 0 {
            return Err(Status::internal(
                "unable to save checklists, the service is shutting down",
            ));
        }

        Ok(MultiCreateChecklistResponse {
            total_saved: u32::try_from(total_saved).unwrap_or(u32::MAX),
        })
    }

    async fn describe_checklist_impl(
        &self,
        req: DescribeChecklistRequest,
    ) -> Result<DescribeChecklistResponse, Status> {
        if req.checklist_id.is_empty() {
            return Err(Status::invalid_argument("checklist_id parameter is absent"));
        }

        let checklist = self
            .repository
            .describe(&self.request_token(), req.user_id, &req.checklist_id)
            .await
            .map_err(|e| storage_error_to_status(e, "unable to describe checklist"))?;

        Ok(DescribeChecklistResponse {
            checklist: Some(checklist_to_proto(&checklist)),
        })
    }

    async fn list_checklists_impl(
        &self,
        req: ListChecklistsRequest,
    ) -> Result<ListChecklistsResponse, Status> {
        let checklists = self
            .repository
            .list(&self.request_token(), req.user_id, req.limit, req.offset)
            .await
            .map_err(|e| storage_error_to_status(e, "unable to list checklists"))?;

        Ok(ListChecklistsResponse {
            checklists: user_checklists_to_proto(&checklists),
        })
    }

    async fn remove_checklist_impl(
        &self,
        req: RemoveChecklistRequest,
    ) -> Result<RemoveChecklistResponse, Status> {
        if req.checklist_id.is_empty() {
            return Err(Status::invalid_argument("checklist_id parameter is absent"));
        }

        self.repository
            .remove(&self.request_token(), req.user_id, &req.checklist_id)
            .await
            .map_err(|e| storage_error_to_status(e, "unable to remove checklist"))?;

        Ok(RemoveChecklistResponse {})
    }

    async fn update_checklist_impl(
        &self,
        req: UpdateChecklistRequest,
    ) -> Result<UpdateChecklistResponse, Status> {
        if req.checklist_id.is_empty() {
            return Err(Status::invalid_argument("checklist_id parameter is absent"));
        }
        let checklist = req
            .checklist
            .ok_or_else(|| Status::invalid_argument("checklist parameter is absent"))?;
        let checklist = checklist_from_proto(checklist, req.checklist_id);
        debug!(
            checklist_id = %checklist.id,
            checklist = %checklist,
            items = ?checklist.items.iter().map(ToString::to_string).collect::<Vec<_>>(),
            complete = checklist.is_complete(),
            "Updating checklist"
        );

        self.repository
            .update(&self.request_token(), &checklist)
            .await
            .map_err(|e| storage_error_to_status(e, "unable to update checklist"))?;

        Ok(UpdateChecklistResponse {})
    }
}

/// Logs the request, runs `body` in a handler-named span and records the outcome.
macro_rules! handle {
    ($self:ident, $handler:expr, $request:ident, $body:ident) => {{
        let handler: Handler = $handler;
        let req = $request.into_inner();
        debug!(handler = handler.as_str(), params = ?req, "Handling request");

        let result = $self
            .$body(req)
            .instrument(info_span!(
                "grpc",
                handler = handler.as_str(),
                otel.name = handler.as_str()
            ))
            .await;
        $self.metrics.record(handler, &result);
        result.map(Response::new)
    }};
}

#[tonic::async_trait]
impl<R: ChecklistRepository> ChecklistStorage for ChecklistGrpcService<R> {
    async fn create_checklist(
        &self,
        request: Request<CreateChecklistRequest>,
    ) -> Result<Response<CreateChecklistResponse>, Status> {
        handle!(self, Handler::CreateChecklist, request, create_checklist_impl)
    }

    async fn multi_create_checklist(
        &self,
        request: Request<MultiCreateChecklistRequest>,
    ) -> Result<Response<MultiCreateChecklistResponse>, Status> {
        handle!(
            self,
            Handler::MultiCreateChecklist,
            request,
            multi_create_checklist_impl
        )
    }

    async fn describe_checklist(
        &self,
        request: Request<DescribeChecklistRequest>,
    ) -> Result<Response<DescribeChecklistResponse>, Status> {
        handle!(self, Handler::DescribeChecklist, request, describe_checklist_impl)
    }

    async fn list_checklists(
        &self,
        request: Request<ListChecklistsRequest>,
    ) -> Result<Response<ListChecklistsResponse>, Status> {
        handle!(self, Handler::ListChecklists, request, list_checklists_impl)
    }

    async fn remove_checklist(
        &self,
        request: Request<RemoveChecklistRequest>,
    ) -> Result<Response<RemoveChecklistResponse>, Status> {
        handle!(self, Handler::RemoveChecklist, request, remove_checklist_impl)
    }

    async fn update_checklist(
        &self,
        request: Request<UpdateChecklistRequest>,
    ) -> Result<Response<UpdateChecklistResponse>, Status> {
        handle!(self, Handler::UpdateChecklist, request, update_checklist_impl)
    }
}

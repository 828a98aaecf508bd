use super::request::parse_request;
use super::response::{write_method_not_allowed, write_not_found, write_outcome};
use crate::app::{App, Dispatch};
use may_minihttp::{HttpService, Request, Response};
use std::io;
use std::sync::Arc;
use tracing::{debug, info};

/// `may_minihttp` service that feeds every request to an [`App`].
///
/// Cloned per connection; clones share the same app.
#[derive(Clone)]
pub struct AppService {
    app: Arc<App>,
}

impl AppService {
    pub fn new(app: Arc<App>) -> Self {
        Self { app }
    }

    pub fn app(&self) -> &Arc<App> {
        &self.app
    }
}

impl HttpService for AppService {
    fn call(&mut self, req: Request, res: &mut Response) -> io::Result<()> {
        let raw = parse_request(req);
        let method = raw.method.clone();
        let path = raw.path.clone();
        let request_id = raw.request_id;

        match self.app.handle(raw) {
            Dispatch::Handled(outcome) => {
                info!(
                    request_id = %request_id,
                    method = %method,
                    path = %path,
                    status = outcome.status(),
                    "request completed"
                );
                write_outcome(res, &outcome);
            }
            Dispatch::MethodNotAllowed(allowed) => {
                debug!(request_id = %request_id, method = %method, path = %path, "method not allowed");
                write_method_not_allowed(res, &method, &path, &allowed);
            }
            Dispatch::NotFound => {
                debug!(request_id = %request_id, method = %method, path = %path, "no route");
                write_not_found(res, &method, &path);
            }
        }
        Ok(())
    }
}

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use super::controller::{PaginationController, Phase};
use super::scroll::{ScrollMetrics, ScrollObserver, ViewportId};
use crate::client::QueryClient;
use crate::endpoint::EndpointKind;
use crate::error::QueryError;

/// An infinite-scroll listing: a pagination controller driven by a
/// scroll observer bound to one viewport.
#[derive(Debug)]
pub struct PaginatedQuery<T> {
  controller: PaginationController<T>,
  observer: ScrollObserver,
}

impl<T: DeserializeOwned> PaginatedQuery<T> {
  /// Create the listing and request its first page.
  pub(crate) fn mount(
    client: &mut QueryClient,
    endpoint_id: &str,
    filter: Value,
    page_size: usize,
  ) -> Result<Self, QueryError> {
    let endpoint = client.registry().expect(endpoint_id, EndpointKind::Query)?.id;
    let mut controller = PaginationController::new(endpoint, filter, page_size)?;
    controller.request_next(client)?;
    Ok(Self {
      controller,
      observer: ScrollObserver::new(client.options().lookahead_viewports),
    })
  }

  pub fn items(&self) -> &[T] {
    self.controller.items()
  }

  pub fn is_loading(&self) -> bool {
    self.controller.is_fetching()
  }

  pub fn is_exhausted(&self) -> bool {
    self.controller.is_exhausted()
  }

  pub fn error(&self) -> Option<&QueryError> {
    self.controller.error()
  }

  pub fn phase(&self) -> &Phase {
    self.controller.phase()
  }

  pub fn controller(&self) -> &PaginationController<T> {
    &self.controller
  }

  pub fn bind_viewport(&mut self, viewport: ViewportId) {
    self.observer.bind(viewport);
  }

  pub fn unbind_viewport(&mut self, viewport: ViewportId) -> bool {
    self.observer.unbind(viewport)
  }

  pub fn bound_viewport(&self) -> Option<ViewportId> {
    self.observer.binding()
  }

  /// Feed a scroll event (or the initial layout) of `viewport`. Returns
  /// `true` if it requested the next page.
  pub fn on_scroll(
    &mut self,
    client: &mut QueryClient,
    viewport: ViewportId,
    metrics: ScrollMetrics,
  ) -> Result<bool, QueryError> {
    if self.controller.is_exhausted()
      || !self
        .observer
        .should_load(viewport, &metrics, self.controller.is_fetching())
    {
      return Ok(false);
    }
    self.controller.request_next(client)
  }

  /// "Load next" without a scroll event.
  pub fn load_next(&mut self, client: &mut QueryClient) -> Result<bool, QueryError> {
    self.controller.request_next(client)
  }

  /// Switch to a new filter. A different filter resets the listing and
  /// requests its first page; an equal one is a no-op.
  pub fn set_filter<F>(&mut self, client: &mut QueryClient, filter: &F) -> Result<bool, QueryError>
  where
    F: Serialize + ?Sized,
  {
    let filter = serde_json::to_value(filter)
      .map_err(|e| QueryError::validation(self.controller.endpoint(), e.to_string()))?;
    if !self.controller.set_filter(filter)? {
      return Ok(false);
    }
    self.controller.request_next(client)?;
    Ok(true)
  }

  /// Start over from page 0, e.g. after a mutation the caller knows
  /// reshapes the listing.
  pub fn reset(&mut self, client: &mut QueryClient) -> Result<(), QueryError> {
    self.controller.reset();
    self.controller.request_next(client)?;
    Ok(())
  }

  /// Pull new results from the client. Returns `true` if anything visible
  /// changed.
  pub fn sync(&mut self, client: &QueryClient) -> bool {
    self.controller.sync(client)
  }

  /// Tear down: unbind the viewport and release every page.
  pub fn unmount(mut self, client: &mut QueryClient) {
    if let Some(viewport) = self.observer.binding() {
      self.observer.unbind(viewport);
    }
    self.controller.release(client);
  }
}

use std::sync::atomic::{AtomicU64, Ordering};

/// Identity of one scrollable viewport.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ViewportId(u64);

impl ViewportId {
  /// A process-unique viewport id.
  pub fn next() -> Self {
    static NEXT: AtomicU64 = AtomicU64::new(1);
    Self(NEXT.fetch_add(1, Ordering::Relaxed))
  }
}

/// Geometry of a viewport at one scroll position, in any consistent unit
/// (pixels, terminal rows).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ScrollMetrics {
  /// Height of the whole content
  pub scroll_height: u32,
  /// Visible height
  pub client_height: u32,
  /// Offset of the first visible unit
  pub scroll_top: u32,
}

impl ScrollMetrics {
  pub fn new(scroll_height: u32, client_height: u32, scroll_top: u32) -> Self {
    Self {
      scroll_height,
      client_height,
      scroll_top,
    }
  }

  /// Content left below the visible area.
  pub fn distance_to_bottom(&self) -> u32 {
    self
      .scroll_height
      .saturating_sub(self.client_height)
      .saturating_sub(self.scroll_top)
  }
}

/// Decides when a bound viewport is close enough to its end to ask for
/// the next page.
#[derive(Debug, Clone, PartialEq)]
pub struct ScrollObserver {
  lookahead: f64,
  binding: Option<ViewportId>,
}

impl ScrollObserver {
  /// `lookahead` is the trigger distance in viewport heights.
  pub fn new(lookahead: f64) -> Self {
    let lookahead = if lookahead.is_finite() && lookahead >= 0.0 {
      lookahead
    } else {
      1.0
    };
    Self {
      lookahead,
      binding: None,
    }
  }

  /// Bind `viewport`, replacing any previous binding.
  pub fn bind(&mut self, viewport: ViewportId) {
    self.binding = Some(viewport);
  }

  /// Unbind `viewport`. Unbinding a viewport that is not bound is a no-op.
  pub fn unbind(&mut self, viewport: ViewportId) -> bool {
    if self.binding == Some(viewport) {
      self.binding = None;
      true
    } else {
      false
    }
  }

  pub fn binding(&self) -> Option<ViewportId> {
    self.binding
  }

  pub fn threshold(&self, metrics: &ScrollMetrics) -> u32 {
    (f64::from(metrics.client_height) * self.lookahead).floor() as u32
  }

  /// Whether a scroll event on `viewport` should trigger "load next".
  /// Events from unbound viewports and events while a fetch is in flight
  /// never do.
  pub fn should_load(&self, viewport: ViewportId, metrics: &ScrollMetrics, in_flight: bool) -> bool {
    self.binding == Some(viewport) && !in_flight && metrics.distance_to_bottom() <= self.threshold(metrics)
  }
}

impl Default for ScrollObserver {
  fn default() -> Self {
    Self::new(1.0)
  }
}

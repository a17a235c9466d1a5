//! Clone proxies: free-floating duplicates of a window's rendered content.
//!
//! A clone stands in for a window when clip and translation of the real
//! surface cannot represent it. While a clone is shown the source surface is
//! made transparent, and destroying the clone restores it.
//!
//! Clones can be torn down by the window system at any time, so every
//! tracked proxy is checked before reuse and pruned when the check fails.

use crate::system::{SurfaceError, SurfaceId, WindowSystem};
use crate::{Point, WindowId};
use std::collections::HashMap;
use tracing::debug;

const OPAQUE: u8 = 255;

/// A tracked clone of one window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CloneProxy {
    /// The clone itself.
    pub surface: SurfaceId,
    /// The window's own surface the clone duplicates.
    pub source: SurfaceId,
    pub position: Point,
}

/// Owner of every clone, keyed by source window.
#[derive(Debug, Default)]
pub struct CloneManager {
    clones: HashMap<WindowId, CloneProxy>,
}

impl CloneManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the window's clone placed at `position`, creating it if needed.
    pub fn get_or_create<W: WindowSystem + ?Sized>(
        &mut self,
        system: &mut W,
        window: WindowId,
        position: Point,
    ) -> Result<SurfaceId, SurfaceError> {
        if let Some(proxy) = self.clones.get(&window).copied() {
            let reused = system
                .check_alive(proxy.surface)
                .and_then(|_| system.set_surface_position(proxy.surface, position))
                .and_then(|_| system.set_visible(proxy.surface, true))
                .and_then(|_| system.set_opacity(proxy.source, 0));
            match reused {
                Ok(()) => {
                    if let Some(tracked) = self.clones.get_mut(&window) {
                        tracked.position = position;
                    }
                    return Ok(proxy.surface);
                }
                Err(e) => {
                    debug!("Discarding stale clone of window {}: {}", window, e);
                    self.clones.remove(&window);
                }
            }
        }

        let source = system
            .surface_of(window)
            .ok_or(SurfaceError::NoSurface(window))?;
        let surface = system.create_clone(source)?;

        let placed = system
            .set_surface_position(surface, position)
            .and_then(|_| system.set_visible(surface, true))
            .and_then(|_| system.set_opacity(source, 0));
        if let Err(e) = placed {
            let _ = system.destroy_surface(surface);
            return Err(e);
        }

        debug!("Created clone {:?} for window {}", surface, window);
        self.clones.insert(
            window,
            CloneProxy {
                surface,
                source,
                position,
            },
        );
        Ok(surface)
    }

    /// Dispose a window's clone and make the real window visible again.
    ///
    /// Returns whether a clone was tracked.
    pub fn destroy<W: WindowSystem + ?Sized>(&mut self, system: &mut W, window: WindowId) -> bool {
        let Some(proxy) = self.clones.remove(&window) else {
            return false;
        };
        if let Err(e) = system.destroy_surface(proxy.surface) {
            debug!("Clone of window {} already gone: {}", window, e);
        }
        restore(system, proxy.source);
        true
    }

    /// Hide every clone and restore full visibility on `windows`.
    ///
    /// Used when leaving the canvas presentation, e.g. for an interactive
    /// drag. Clones that fail to hide are pruned.
    pub fn hide_all<W: WindowSystem + ?Sized>(&mut self, system: &mut W, windows: &[WindowId]) {
        self.clones.retain(|window, proxy| {
            match system.set_visible(proxy.surface, false) {
                Ok(()) => true,
                Err(e) => {
                    debug!("Pruning clone of window {}: {}", window, e);
                    false
                }
            }
        });

        for &window in windows {
            if let Some(surface) = system.surface_of(window) {
                restore(system, surface);
            }
        }
    }

    /// Dispose every clone unconditionally.
    pub fn destroy_all<W: WindowSystem + ?Sized>(&mut self, system: &mut W) {
        for (window, proxy) in self.clones.drain() {
            if let Err(e) = system.destroy_surface(proxy.surface) {
                debug!("Clone of window {} already gone: {}", window, e);
            }
            restore(system, proxy.source);
        }
    }

    pub fn get(&self, window: WindowId) -> Option<&CloneProxy> {
        self.clones.get(&window)
    }

    pub fn len(&self) -> usize {
        self.clones.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clones.is_empty()
    }
}

/// Best-effort return of a window surface to its normal appearance.
fn restore<W: WindowSystem + ?Sized>(system: &mut W, surface: SurfaceId) {
    let restored = system
        .set_opacity(surface, OPAQUE)
        .and_then(|_| system.set_visible(surface, true));
    if let Err(e) = restored {
        debug!("Could not restore surface {:?}: {}", surface, e);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::headless::HeadlessWindowSystem;
    use crate::Rect;

    fn setup() -> (HeadlessWindowSystem, SurfaceId) {
        let mut system = HeadlessWindowSystem::new();
        system.set_work_area(0, 0, Rect::new(0, 0, 1280, 720));
        let surface = system.add_window(1, 0, 0, Rect::new(100, 0, 400, 700));
        (system, surface)
    }

    #[test]
    fn test_get_or_create_places_clone_and_hides_source() {
        let (mut system, source) = setup();
        let mut clones = CloneManager::new();

        let clone = clones
            .get_or_create(&mut system, 1, Point::new(-300, 0))
            .unwrap();
        assert_ne!(clone, source);
        assert_eq!(system.surface_position(clone), Ok(Point::new(-300, 0)));
        assert_eq!(system.opacity(source), Ok(0));
        assert_eq!(clones.get(1).map(|p| p.source), Some(source));
    }

    #[test]
    fn test_get_or_create_reuses_live_clone() {
        let (mut system, _) = setup();
        let mut clones = CloneManager::new();

        let first = clones.get_or_create(&mut system, 1, Point::new(0, 0)).unwrap();
        let second = clones
            .get_or_create(&mut system, 1, Point::new(50, 0))
            .unwrap();
        assert_eq!(first, second);
        assert_eq!(system.surface_position(first), Ok(Point::new(50, 0)));
        assert_eq!(clones.get(1).map(|p| p.position), Some(Point::new(50, 0)));
        assert_eq!(clones.len(), 1);
    }

    #[test]
    fn test_get_or_create_replaces_disposed_clone() {
        let (mut system, _) = setup();
        let mut clones = CloneManager::new();

        let first = clones.get_or_create(&mut system, 1, Point::new(0, 0)).unwrap();
        system.dispose_surface(first);

        let second = clones.get_or_create(&mut system, 1, Point::new(0, 0)).unwrap();
        assert_ne!(first, second);
        assert!(system.check_alive(second).is_ok());
    }

    #[test]
    fn test_get_or_create_without_surface_fails() {
        let mut system = HeadlessWindowSystem::new();
        system.add_window_without_surface(9, 0, 0, Rect::new(0, 0, 100, 100));
        let mut clones = CloneManager::new();

        assert_eq!(
            clones.get_or_create(&mut system, 9, Point::new(0, 0)),
            Err(SurfaceError::NoSurface(9))
        );
        assert!(clones.is_empty());
    }

    #[test]
    fn test_destroy_restores_source() {
        let (mut system, source) = setup();
        let mut clones = CloneManager::new();
        let clone = clones.get_or_create(&mut system, 1, Point::new(0, 0)).unwrap();

        assert!(clones.destroy(&mut system, 1));
        assert!(system.check_alive(clone).is_err());
        assert_eq!(system.opacity(source), Ok(255));
        assert!(!clones.destroy(&mut system, 1));
    }

    #[test]
    fn test_hide_all_prunes_disposed_and_restores_windows() {
        let (mut system, source) = setup();
        system.add_window(2, 0, 0, Rect::new(600, 0, 400, 700));
        let mut clones = CloneManager::new();

        let kept = clones.get_or_create(&mut system, 1, Point::new(0, 0)).unwrap();
        let lost = clones.get_or_create(&mut system, 2, Point::new(500, 0)).unwrap();
        system.dispose_surface(lost);

        clones.hide_all(&mut system, &[1, 2]);

        assert_eq!(clones.len(), 1);
        assert_eq!(system.surface(kept).map(|s| s.visible), Some(false));
        assert_eq!(system.opacity(source), Ok(255));
    }

    #[test]
    fn test_reshowing_hidden_clone_hides_source_again() {
        let (mut system, source) = setup();
        let mut clones = CloneManager::new();
        let clone = clones.get_or_create(&mut system, 1, Point::new(0, 0)).unwrap();

        clones.hide_all(&mut system, &[1]);
        assert_eq!(system.opacity(source), Ok(255));

        let reused = clones
            .get_or_create(&mut system, 1, Point::new(-100, 0))
            .unwrap();
        assert_eq!(reused, clone);
        assert_eq!(system.surface(clone).map(|s| s.visible), Some(true));
        assert_eq!(system.opacity(source), Ok(0));
    }

    #[test]
    fn test_destroy_all() {
        let (mut system, source) = setup();
        system.add_window(2, 0, 0, Rect::new(600, 0, 400, 700));
        let mut clones = CloneManager::new();
        let a = clones.get_or_create(&mut system, 1, Point::new(0, 0)).unwrap();
        let b = clones.get_or_create(&mut system, 2, Point::new(0, 0)).unwrap();

        clones.destroy_all(&mut system);
        assert!(clones.is_empty());
        assert!(system.check_alive(a).is_err());
        assert!(system.check_alive(b).is_err());
        assert_eq!(system.opacity(source), Ok(255));
    }
}

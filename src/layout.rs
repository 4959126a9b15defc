/// Host-reported panel geometry, in host pixels.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Viewport {
    pub width: f64,
    pub height: f64,
    pub screen_height: f64,
    pub externalized: bool,
}

/// Fixed design constants, expressed at the reference screen height.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LayoutConstants {
    pub reference_screen_height: f64,
    pub header_height: f64,
    pub header_margin_bottom: f64,
    pub content_margin: f64,
    pub widget_aspect_ratio: f64,
}

impl Default for LayoutConstants {
    fn default() -> Self {
        Self {
            reference_screen_height: 2160.0,
            header_height: 84.0,
            header_margin_bottom: 3.0,
            content_margin: 6.0,
            widget_aspect_ratio: 280.0 / 260.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LayoutMetrics {
    pub container_width: f64,
    pub container_height: f64,
    pub widget_width: f64,
    pub header_height: f64,
}

impl LayoutMetrics {
    /// Container and widget size for `vp`.
    ///
    /// Docked panels lose the header strip; externalized ones get the full
    /// height. The widget keeps its aspect ratio inside the container.
    pub fn compute(vp: &Viewport, k: &LayoutConstants) -> Self {
        let scaled = |v: f64| vp.screen_height * v / k.reference_screen_height;
        let content_margin = scaled(k.content_margin);
        let header_height = scaled(k.header_height + k.header_margin_bottom);

        let container_width = vp.width - content_margin * 2.0;
        let container_height = vp.height
            - content_margin * 2.0
            - if vp.externalized { 0.0 } else { header_height };

        let widget_width = container_width.min(container_height * k.widget_aspect_ratio);

        Self {
            container_width,
            container_height,
            widget_width,
            header_height,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vp(externalized: bool) -> Viewport {
        Viewport {
            width: 1000.0,
            height: 800.0,
            screen_height: 2160.0,
            externalized,
        }
    }

    #[test]
    fn docked_panel_at_reference_height() {
        let m = LayoutMetrics::compute(&vp(false), &LayoutConstants::default());
        assert_eq!(m.header_height, 87.0);
        assert_eq!(m.container_width, 988.0);
        assert_eq!(m.container_height, 701.0);
        let expected = 701.0 * 280.0 / 260.0;
        assert!((m.widget_width - expected).abs() < 1e-9);
    }

    #[test]
    fn externalized_panel_drops_the_header() {
        let m = LayoutMetrics::compute(&vp(true), &LayoutConstants::default());
        assert_eq!(m.container_height, 788.0);
        let expected = 788.0 * 280.0 / 260.0;
        assert!((m.widget_width - expected).abs() < 1e-9);
    }

    #[test]
    fn margins_scale_with_screen_height() {
        let v = Viewport {
            width: 400.0,
            height: 2000.0,
            screen_height: 1080.0,
            externalized: false,
        };
        let m = LayoutMetrics::compute(&v, &LayoutConstants::default());
        assert_eq!(m.header_height, 43.5);
        assert_eq!(m.container_width, 394.0);
        // tall, narrow panel: width is the binding side
        assert_eq!(m.widget_width, 394.0);
    }

    #[test]
    fn same_inputs_same_outputs() {
        let k = LayoutConstants::default();
        assert_eq!(
            LayoutMetrics::compute(&vp(false), &k),
            LayoutMetrics::compute(&vp(false), &k)
        );
    }
}

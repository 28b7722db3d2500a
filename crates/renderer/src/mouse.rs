/// Pointer state feeding `iMouse`, in viewport pixels with the origin at the
/// top-left corner as reported by windowing systems.
#[derive(Debug, Default, Clone, Copy)]
pub(crate) struct MouseState {
    position: Option<[f32; 2]>,
    click: Option<[f32; 2]>,
    pressed: bool,
}

impl MouseState {
    pub fn cursor_moved(&mut self, x: f32, y: f32) {
        self.position = Some([x, y]);
    }

    pub fn button(&mut self, pressed: bool) {
        if pressed && !self.pressed {
            self.click = self.position;
        }
        self.pressed = pressed;
    }

    /// `xy` is the current position, `zw` the last click position, which is
    /// negated while the button is up. Both are flipped to a bottom-left origin.
    pub fn as_uniform(&self, height: f32) -> [f32; 4] {
        let mut data = [0.0; 4];

        if let Some([x, y]) = self.position {
            data[0] = x;
            data[1] = height - y;
        }

        if let Some([x, y]) = self.click {
            let sign = if self.pressed { 1.0 } else { -1.0 };
            data[2] = sign * x;
            data[3] = sign * (height - y);
        }

        data
    }
}

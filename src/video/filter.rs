//! Symbolic crop expressions for ffmpeg.
//!
//! The expression applies the same rule as
//! [`centered_crop`](crate::imaging::centered_crop): wider than the ratio
//! trims width, otherwise trims height, centred either way. Commas inside
//! `if()`/`gt()` are escaped so the filter parser does not split on them.

use crate::imaging::AspectRatio;

/// `crop=w:h:x:y` for `ratio`, evaluated by ffmpeg against the input size.
pub fn crop_expression(ratio: AspectRatio) -> String {
    let r = format!("{:.6}", ratio.as_f64());
    let wider = format!("gt(iw/ih\\,{r})");
    let w = format!("if({wider}\\,ih*{r}\\,iw)");
    let h = format!("if({wider}\\,ih\\,iw/{r})");
    format!("crop={w}:{h}:(iw-{w})/2:(ih-{h})/2")
}

/// Crop followed by a scale to `height` with an even, aspect-preserving width.
pub fn filter_graph(ratio: AspectRatio, height: u32) -> String {
    format!("{},scale=-2:{height}", crop_expression(ratio))
}

//! C-compatible foreign-function surface
//!
//! Opaque-handle pattern for C, Python ctypes, and other FFI callers.
//! All library errors are caught and translated to integer status codes;
//! the last error message is stored per handle and cleared on success.

use std::ffi::{c_char, c_double, c_int, CStr, CString};

use crate::error::InferirError;
use crate::handle::ModelHandle;
use crate::logger::LogLevel;
use crate::tensor::Tensor;

/// Success
pub const INFERIR_OK: c_int = 0;
/// Model could not be loaded
pub const INFERIR_ERR_LOAD: c_int = 1;
/// Inference failed
pub const INFERIR_ERR_INFERENCE: c_int = 2;
/// Input rejected by validation
pub const INFERIR_ERR_VALIDATION: c_int = 3;
/// Bad pointer or size argument
pub const INFERIR_ERR_INVALID_ARG: c_int = 4;

/// Opaque model handle exposed to foreign callers
pub struct InferirModel {
    handle: ModelHandle,
    last_error: Option<CString>,
}

impl InferirModel {
    fn set_error(&mut self, message: impl Into<Vec<u8>>) {
        self.last_error = CString::new(message).ok();
    }
}

fn status_for(err: &InferirError) -> c_int {
    match err {
        InferirError::ModelLoad { .. } => INFERIR_ERR_LOAD,
        InferirError::Validation { .. } => INFERIR_ERR_VALIDATION,
        InferirError::Inference { .. } => INFERIR_ERR_INFERENCE,
        InferirError::InvalidArgument { .. } => INFERIR_ERR_INVALID_ARG,
    }
}

/// Load a `.titan` model file
///
/// `input_shape` may be null (with `shape_len` 0) to infer the shape from
/// the first Dense layer. Returns null on any failure.
///
/// # Safety
///
/// `model_path` must be a valid NUL-terminated UTF-8 string. If
/// `input_shape` is non-null it must point to `shape_len` readable
/// `usize` values.
#[no_mangle]
pub unsafe extern "C" fn inferir_load(
    model_path: *const c_char,
    input_shape: *const usize,
    shape_len: usize,
) -> *mut InferirModel {
    if model_path.is_null() {
        return std::ptr::null_mut();
    }
    let Ok(path) = CStr::from_ptr(model_path).to_str() else {
        return std::ptr::null_mut();
    };

    let mut builder = ModelHandle::builder()
        .model_path(path)
        .log_level(LogLevel::Silent);

    if !input_shape.is_null() && shape_len > 0 {
        let shape = std::slice::from_raw_parts(input_shape, shape_len).to_vec();
        builder = builder.input_shape(shape);
    }

    match builder.build() {
        Ok(handle) => Box::into_raw(Box::new(InferirModel {
            handle,
            last_error: None,
        })),
        Err(_) => std::ptr::null_mut(),
    }
}

/// Free a model handle (null-safe)
///
/// # Safety
///
/// `model` must be null or a pointer returned by [`inferir_load`] that has
/// not been freed yet.
#[no_mangle]
pub unsafe extern "C" fn inferir_free(model: *mut InferirModel) {
    if !model.is_null() {
        drop(Box::from_raw(model));
    }
}

/// Run inference on a flat float input
///
/// Writes up to `output_len` floats into `output_data` and stores the true
/// output length in `actual_output_len`.
///
/// # Safety
///
/// `model` must be a live handle from [`inferir_load`]; `input_data` must
/// point to `input_len` readable floats; `output_data` must point to
/// `output_len` writable floats; `actual_output_len` must be writable.
#[no_mangle]
pub unsafe extern "C" fn inferir_predict(
    model: *mut InferirModel,
    input_data: *const f32,
    input_len: usize,
    output_data: *mut f32,
    output_len: usize,
    actual_output_len: *mut usize,
) -> c_int {
    let Some(model) = model.as_mut() else {
        return INFERIR_ERR_INVALID_ARG;
    };
    if input_data.is_null() || output_data.is_null() || actual_output_len.is_null() {
        model.set_error("null pointer argument");
        return INFERIR_ERR_INVALID_ARG;
    }

    let shape = match model.handle.expected_input_shape() {
        Ok(shape) => shape,
        Err(err) => {
            model.set_error(err.to_string());
            return status_for(&err);
        }
    };

    let expected_len: usize = shape.iter().product();
    if input_len != expected_len {
        model.set_error(format!(
            "input length {input_len} does not match expected {expected_len}"
        ));
        return INFERIR_ERR_VALIDATION;
    }

    let input_slice = std::slice::from_raw_parts(input_data, input_len);
    let input = match Tensor::from_vec(shape, input_slice.to_vec()) {
        Ok(t) => t,
        Err(err) => {
            model.set_error(err.to_string());
            return status_for(&err);
        }
    };

    match model.handle.predict(&input) {
        Ok(result) => {
            *actual_output_len = result.size();
            if output_len < result.size() {
                model.set_error(format!(
                    "output buffer too small: need {}, got {output_len}",
                    result.size()
                ));
                return INFERIR_ERR_INVALID_ARG;
            }
            std::ptr::copy_nonoverlapping(result.as_ptr(), output_data, result.size());
            model.last_error = None;
            INFERIR_OK
        }
        Err(err) => {
            model.set_error(err.to_string());
            status_for(&err)
        }
    }
}

/// Last error message for a handle, or null if the last call succeeded
///
/// The string is valid until the next failing call on the same handle.
///
/// # Safety
///
/// `model` must be null or a live handle from [`inferir_load`].
#[no_mangle]
pub unsafe extern "C" fn inferir_last_error(model: *const InferirModel) -> *const c_char {
    match model.as_ref().and_then(|m| m.last_error.as_ref()) {
        Some(err) => err.as_ptr(),
        None => std::ptr::null(),
    }
}

/// Number of layers in the model (0 for a null handle)
///
/// # Safety
///
/// `model` must be null or a live handle from [`inferir_load`].
#[no_mangle]
pub unsafe extern "C" fn inferir_layer_count(model: *const InferirModel) -> usize {
    model.as_ref().map_or(0, |m| m.handle.layer_count())
}

/// 1 if a model is loaded, 0 otherwise
///
/// # Safety
///
/// `model` must be null or a live handle from [`inferir_load`].
#[no_mangle]
pub unsafe extern "C" fn inferir_is_loaded(model: *const InferirModel) -> c_int {
    c_int::from(model.as_ref().is_some_and(|m| m.handle.is_loaded()))
}

/// Number of profiled inference calls
///
/// # Safety
///
/// `model` must be null or a live handle from [`inferir_load`].
#[no_mangle]
pub unsafe extern "C" fn inferir_inference_count(model: *const InferirModel) -> c_int {
    model
        .as_ref()
        .map_or(0, |m| c_int::try_from(m.handle.stats().inference_count).unwrap_or(c_int::MAX))
}

/// Mean inference latency in milliseconds
///
/// # Safety
///
/// `model` must be null or a live handle from [`inferir_load`].
#[no_mangle]
pub unsafe extern "C" fn inferir_mean_latency_ms(model: *const InferirModel) -> c_double {
    model.as_ref().map_or(0.0, |m| m.handle.stats().mean_latency_ms)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::format::save_model;
    use crate::layers::{Dense, Relu, Sequential};

    fn save_model_file(dir: &tempfile::TempDir) -> CString {
        let mut model = Sequential::new();
        let mut dense = Dense::new(2, 2, true).unwrap();
        dense
            .set_weights(Tensor::from_vec(vec![2, 2], vec![1.0, 0.0, 0.0, 1.0]).unwrap())
            .unwrap();
        model.add(Box::new(dense));
        model.add(Box::new(Relu));
        let path = dir.path().join("tiny.titan");
        save_model(&model, &path).unwrap();
        CString::new(path.to_str().unwrap()).unwrap()
    }

    #[test]
    fn test_load_predict_free() {
        let dir = tempfile::tempdir().unwrap();
        let path = save_model_file(&dir);

        unsafe {
            let model = inferir_load(path.as_ptr(), std::ptr::null(), 0);
            assert!(!model.is_null());
            assert_eq!(inferir_is_loaded(model), 1);
            assert_eq!(inferir_layer_count(model), 2);

            let input = [1.0f32, -2.0];
            let mut output = [0.0f32; 2];
            let mut actual = 0usize;
            let status = inferir_predict(
                model,
                input.as_ptr(),
                2,
                output.as_mut_ptr(),
                2,
                &mut actual,
            );
            assert_eq!(status, INFERIR_OK);
            assert_eq!(actual, 2);
            assert_eq!(output, [1.0, 0.0]);
            assert!(inferir_last_error(model).is_null());

            inferir_free(model);
        }
    }

    #[test]
    fn test_wrong_input_length() {
        let dir = tempfile::tempdir().unwrap();
        let path = save_model_file(&dir);

        unsafe {
            let model = inferir_load(path.as_ptr(), std::ptr::null(), 0);
            assert!(!model.is_null());

            let input = [1.0f32; 5];
            let mut output = [0.0f32; 2];
            let mut actual = 0usize;
            let status = inferir_predict(
                model,
                input.as_ptr(),
                5,
                output.as_mut_ptr(),
                2,
                &mut actual,
            );
            assert_eq!(status, INFERIR_ERR_VALIDATION);
            let err = inferir_last_error(model);
            assert!(!err.is_null());
            let msg = CStr::from_ptr(err).to_str().unwrap();
            assert!(msg.contains("does not match"));

            inferir_free(model);
        }
    }

    #[test]
    fn test_output_buffer_too_small() {
        let dir = tempfile::tempdir().unwrap();
        let path = save_model_file(&dir);

        unsafe {
            let model = inferir_load(path.as_ptr(), std::ptr::null(), 0);
            let input = [1.0f32, 1.0];
            let mut output = [0.0f32; 1];
            let mut actual = 0usize;
            let status = inferir_predict(
                model,
                input.as_ptr(),
                2,
                output.as_mut_ptr(),
                1,
                &mut actual,
            );
            assert_eq!(status, INFERIR_ERR_INVALID_ARG);
            // The caller learns the required capacity.
            assert_eq!(actual, 2);
            inferir_free(model);
        }
    }

    #[test]
    fn test_load_failure_returns_null() {
        let bad = CString::new("/missing/nothing.titan").unwrap();
        unsafe {
            let model = inferir_load(bad.as_ptr(), std::ptr::null(), 0);
            assert!(model.is_null());
        }
    }

    #[test]
    fn test_null_safety() {
        unsafe {
            inferir_free(std::ptr::null_mut());
            assert_eq!(inferir_layer_count(std::ptr::null()), 0);
            assert_eq!(inferir_is_loaded(std::ptr::null()), 0);
            assert_eq!(inferir_inference_count(std::ptr::null()), 0);
            assert!(inferir_last_error(std::ptr::null()).is_null());
            assert!(inferir_load(std::ptr::null(), std::ptr::null(), 0).is_null());
        }
    }

    #[test]
    fn test_explicit_shape() {
        let dir = tempfile::tempdir().unwrap();
        let path = save_model_file(&dir);
        let shape = [2usize];
        unsafe {
            let model = inferir_load(path.as_ptr(), shape.as_ptr(), 1);
            assert!(!model.is_null());
            inferir_free(model);
        }
    }
}

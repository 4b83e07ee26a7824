use metadata_core::ResultCode;
use once_cell::sync::Lazy;
use prometheus::{
    register_histogram_vec, register_int_counter_vec, Encoder, HistogramVec, IntCounterVec,
    TextEncoder,
};
use tracing::error;

pub static OPS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "metadata_ops_total",
        "Operations by result code",
        &["op", "code"]
    )
    .unwrap()
});

pub static OP_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    register_histogram_vec!(
        "metadata_op_duration_seconds",
        "Operation latency",
        &["op"]
    )
    .unwrap()
});

pub fn record(op: &str, code: ResultCode) {
    let code = match code {
        ResultCode::Ok => "OK",
        ResultCode::BindError => "BindError",
        ResultCode::ParseError => "ParseError",
        ResultCode::InsertError => "InsertError",
        ResultCode::RemoveError => "RemoveError",
        ResultCode::AuthError => "AuthError",
        ResultCode::StoreError => "StoreError",
    };
    OPS_TOTAL.with_label_values(&[op, code]).inc();
}

/// Text exposition of the default registry.
pub fn render() -> String {
    let mut buf = Vec::new();
    if let Err(e) = TextEncoder::new().encode(&prometheus::gather(), &mut buf) {
        error!(error = %e, "metrics encoding failed");
    }
    String::from_utf8(buf).unwrap_or_default()
}

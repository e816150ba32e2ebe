//! 发送错误分类

/// 单次发送失败的原因
#[derive(Debug, thiserror::Error)]
pub enum SendError {
    /// 连接失败、超时等传输层错误
    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),
    /// 目标返回非 2xx 状态码
    #[error("could not post to {destination}, status: {status}")]
    Status { destination: String, status: u16 },
    /// 请求体编码失败
    #[error("could not encode message: {0}")]
    Encode(#[from] serde_json::Error),
}

impl SendError {
    /// 检查响应状态，非 2xx 视为失败
    pub fn check_status(destination: &str, response: &reqwest::Response) -> Result<(), Self> {
        let status = response.status();
        if status.is_success() {
            Ok(())
        } else {
            Err(Self::Status {
                destination: destination.to_string(),
                status: status.as_u16(),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_error_message() {
        let err = SendError::Status {
            destination: "Slack".to_string(),
            status: 503,
        };
        assert_eq!(err.to_string(), "could not post to Slack, status: 503");
    }
}

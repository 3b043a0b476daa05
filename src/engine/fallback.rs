use std::future::Future;

use tokio_util::sync::CancellationToken;

#[derive(Debug)]
pub struct FallbackSuccess<T> {
    /// 成功的备选项下标。
    pub index: usize,
    pub value: T,
    pub failures: usize,
}

#[derive(Debug)]
pub struct FallbackExhausted<E> {
    pub errors: Vec<E>,
    /// 是否因取消而提前停止。
    pub cancelled: bool,
}

impl<E> FallbackExhausted<E> {
    pub fn last(&self) -> Option<&E> {
        self.errors.last()
    }

    pub fn into_last(self) -> Option<E> {
        self.errors.into_iter().last()
    }
}

/// 按顺序尝试备选项，返回第一个成功结果。
///
/// 取消只在两次尝试之间检查，已经开始的尝试会完整执行。
pub async fn first_success<P, T, E, F, Fut>(
    alternatives: impl IntoIterator<Item = P>,
    cancel: Option<&CancellationToken>,
    mut attempt: F,
) -> Result<FallbackSuccess<T>, FallbackExhausted<E>>
where
    F: FnMut(usize, P) -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let mut errors = Vec::new();
    for (index, alternative) in alternatives.into_iter().enumerate() {
        if index > 0 && cancel.is_some_and(CancellationToken::is_cancelled) {
            return Err(FallbackExhausted {
                errors,
                cancelled: true,
            });
        }
        match attempt(index, alternative).await {
            Ok(value) => {
                return Ok(FallbackSuccess {
                    index,
                    value,
                    failures: errors.len(),
                });
            }
            Err(err) => errors.push(err),
        }
    }
    Err(FallbackExhausted {
        errors,
        cancelled: false,
    })
}

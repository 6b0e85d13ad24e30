// Copyright 2025 RustFS Team
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use k8s_openapi::apimachinery::pkg::apis::meta::v1 as metav1;

pub fn has_finalizer(meta: &metav1::ObjectMeta, finalizer: &str) -> bool {
    meta.finalizers
        .as_ref()
        .is_some_and(|f| f.iter().any(|x| x == finalizer))
}

/// Returns true when the finalizer was added.
pub fn add_finalizer(meta: &mut metav1::ObjectMeta, finalizer: &str) -> bool {
    if has_finalizer(meta, finalizer) {
        return false;
    }
    meta.finalizers
        .get_or_insert_with(Vec::new)
        .push(finalizer.to_owned());
    true
}

/// Returns true when the finalizer was present.
pub fn remove_finalizer(meta: &mut metav1::ObjectMeta, finalizer: &str) -> bool {
    let Some(finalizers) = meta.finalizers.as_mut() else {
        return false;
    };
    let before = finalizers.len();
    finalizers.retain(|f| f != finalizer);
    before != finalizers.len()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_add_and_remove_finalizer() {
        let mut meta = metav1::ObjectMeta::default();
        assert!(add_finalizer(&mut meta, "a/b"));
        assert!(!add_finalizer(&mut meta, "a/b"));
        assert!(has_finalizer(&meta, "a/b"));
        assert!(remove_finalizer(&mut meta, "a/b"));
        assert!(!remove_finalizer(&mut meta, "a/b"));
        assert_eq!(meta.finalizers, Some(vec![]));
    }
}

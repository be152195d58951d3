// Copyright 2025 STARGA Inc.
// Licensed under the Apache License, Version 2.0 (the “License”);
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at:
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an “AS IS” BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

// Part of the MIND project (Machine Intelligence Native Design).

//! Calls into the Fortran-convention numeric kernel library.
//!
//! Scalar arguments are passed by address, so every scalar field names a C
//! variable the caller has already declared. Matrix operands are pointer
//! expressions.

/// `C = alpha * op(A) * op(B) + beta * C`, column-major.
#[derive(Debug, Clone)]
pub struct Sgemm<'a> {
    pub transa: &'a str,
    pub transb: &'a str,
    pub m: &'a str,
    pub n: &'a str,
    pub k: &'a str,
    pub alpha: &'a str,
    pub a: String,
    pub lda: &'a str,
    pub b: String,
    pub ldb: &'a str,
    pub beta: &'a str,
    pub c: String,
    pub ldc: &'a str,
}

impl Sgemm<'_> {
    pub fn render(&self) -> String {
        format!(
            "BLAS::sgemm_(&{}, &{}, &{}, &{}, &{}, &{}, {}, &{}, {}, &{}, &{}, {}, &{});",
            self.transa,
            self.transb,
            self.m,
            self.n,
            self.k,
            self.alpha,
            self.a,
            self.lda,
            self.b,
            self.ldb,
            self.beta,
            self.c,
            self.ldc
        )
    }
}

/// `y += alpha * x`.
#[derive(Debug, Clone)]
pub struct Saxpy<'a> {
    pub n: &'a str,
    pub alpha: &'a str,
    pub x: String,
    pub incx: &'a str,
    pub y: String,
    pub incy: &'a str,
}

impl Saxpy<'_> {
    pub fn render(&self) -> String {
        format!(
            "BLAS::saxpy_(&{}, &{}, {}, &{}, {}, &{});",
            self.n, self.alpha, self.x, self.incx, self.y, self.incy
        )
    }
}

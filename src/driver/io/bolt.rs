// Copyright Rouven Bauer
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//    https://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

mod chunk;
mod handshake;
mod message;
mod packstream;
mod pool;
mod protocol;
mod socket;

use crate::driver::io::{ChannelOps, ResultBatch, TransactionParameters};
use crate::driver::statement::Statement;
use crate::Result;
pub use pool::BoltConnectionPool;
pub(crate) use pool::PoolConfig;
use pool::PooledBolt;

/// A pooled Bolt connection serving one session or transaction.
#[derive(Debug)]
pub(crate) struct BoltChannel {
    connection: PooledBolt,
}

impl BoltChannel {
    fn new(connection: PooledBolt) -> Self {
        Self { connection }
    }
}

impl ChannelOps for BoltChannel {
    fn run_auto_commit(
        &mut self,
        statements: &[Statement],
        parameters: &TransactionParameters<'_>,
    ) -> Result<ResultBatch> {
        self.connection.run_auto_commit(statements, parameters)
    }

    fn begin(
        &mut self,
        statements: &[Statement],
        parameters: &TransactionParameters<'_>,
    ) -> Result<ResultBatch> {
        self.connection.begin(statements, parameters)
    }

    fn run(&mut self, statements: &[Statement]) -> Result<ResultBatch> {
        self.connection.run(statements)
    }

    fn commit(&mut self, statements: &[Statement]) -> Result<ResultBatch> {
        self.connection.commit(statements)
    }

    fn rollback(&mut self) -> Result<()> {
        self.connection.rollback()
    }
}

/*
 * Copyright (c) 2022, the gwimap authors.
 *
 * This file is part of the gwimap server.
 *
 * This program is free software: you can redistribute it and/or modify
 * it under the terms of the GNU Affero General Public License as
 * published by the Free Software Foundation, either version 3 of
 * the License, or (at your option) any later version.
 *
 * This program is distributed in the hope that it will be useful,
 * but WITHOUT ANY WARRANTY; without even the implied warranty of
 * MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
 * GNU Affero General Public License for more details.
 * in the LICENSE file at the top-level directory of this distribution.
 * You should have received a copy of the GNU Affero General Public License
 * along with this program.  If not, see <http://www.gnu.org/licenses/>.
*/

#![no_main]
use gwimap::core::receiver::Receiver;
use libfuzzer_sys::fuzz_target;

static IMAP_ALPHABET: &[u8] = b"()[]<>{}+-.:=\"NIL012345ABCDEF ";

fuzz_target!(|data: &[u8]| {
    let imap_data = data
        .iter()
        .map(|&byte| IMAP_ALPHABET[byte as usize % IMAP_ALPHABET.len()])
        .collect::<Vec<_>>();

    for bytes in [data, &imap_data[..]] {
        let mut receiver = Receiver::new();
        let mut iter = bytes.iter();
        loop {
            match receiver.parse(&mut iter) {
                Ok(_) => continue,
                Err(gwimap::core::receiver::Error::NeedsLiteral { .. }) => continue,
                Err(gwimap::core::receiver::Error::Error { .. }) => continue,
                Err(gwimap::core::receiver::Error::NeedsMoreData) => break,
            }
        }
    }
});
